//! Built-in C grammar

pub const GRAMMAR: &str = r##"
name = "C"
mime-types = ["text/x-csrc", "text/x-chdr"]

[[span]]
color = "comment.block"
rule = "comment"
begin = '/\*'
end = '\*/'
stop-at-eol = false

[[span]]
color = "comment.line"
rule = "comment"
begin = '//'

[[span]]
color = "string"
begin = '"'
end = '"'
escape = '\'

[[span]]
color = "string"
begin = "'"
end = "'"
escape = '\'

[[span]]
color = "text.preprocessor"
rule = "preprocessor"
begin = '#'
first-non-ws = true
continuation = '\'

[[match]]
color = "constant.digit"
pattern = '(?:0[xX][0-9a-fA-F]+|\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)[uUlLfF]*'

[[keywords]]
color = "keyword.selection"
words = ["if", "else", "switch", "case", "default"]

[[keywords]]
color = "keyword.iteration"
words = ["for", "while", "do"]

[[keywords]]
color = "keyword.jump"
words = ["break", "continue", "goto", "return"]

[[keywords]]
color = "keyword.type"
words = [
    "char", "double", "enum", "float", "int", "long", "short",
    "signed", "struct", "typedef", "union", "unsigned", "void",
]

[[keywords]]
color = "keyword.modifier"
words = [
    "auto", "const", "extern", "inline", "register", "restrict",
    "static", "volatile",
]

[[keywords]]
color = "keyword.operator"
words = ["sizeof"]

[[keywords]]
color = "constant.language"
words = ["true", "false", "NULL"]

[[rule]]
name = "comment"

[[rule.keywords]]
color = "comment.keyword.todo"
words = ["TODO", "FIXME", "HACK", "XXX"]

[[rule]]
name = "preprocessor"
default-style = "text.preprocessor"

[[rule.keywords]]
color = "text.preprocessor.keyword"
words = [
    "include", "define", "undef", "if", "ifdef", "ifndef", "else",
    "elif", "endif", "line", "error", "pragma", "warning",
]
"##;
