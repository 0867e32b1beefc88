//! Filename and interpreter lookup tables
//!
//! Both tables are ordered; every matching row contributes its tags.

/// Filename pattern (searched in the basename) to tags
pub(super) const KNOWN_EXTENSIONS: &[(&str, &[&str])] = &[
    (r"\.js$", &["javascript"]),
    (r"\.json$", &["json"]),
    (r"\.py$", &["python"]),
    (r"\.rb$", &["ruby"]),
    (r"\.sh$", &["shell"]),
    (r"\.e?ya?ml$", &["yaml"]),
    (r"\.pp$", &["puppet"]),
    (r"\.erb$", &["erb"]),
    (r"\.xml$", &["xml"]),
    (r"\.c$", &["c"]),
    (r"^Makefile$", &["make"]),
    (r"\.mk$", &["make"]),
    (r"\.png$", &["png"]),
    (r"\.gif$", &["gif"]),
    (r"\.svg$", &["svg"]),
    (r"\.css$", &["css"]),
    (r"\.html?$", &["html"]),
    (r"\.php\d?$", &["php"]),
    (r"\.rs$", &["rust"]),
    (r"\.toml$", &["toml"]),
    (r"\.md$", &["markdown"]),
    (r"\.go$", &["go"]),
];

/// Interpreter basename pattern (anchored) to tags
pub(super) const KNOWN_INTERPRETERS: &[(&str, &[&str])] = &[
    (r"^python([23](\.[0-9]+)?)?$", &["python"]),
    (r"^(ba|da|tc|[ckz])?sh$", &["shell"]),
    (r"^ruby$", &["ruby"]),
    (r"^node(js)?$", &["javascript"]),
];
