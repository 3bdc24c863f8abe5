use std::sync::LazyLock;

use backtrace::Backtrace;
use regex::Regex;

static HASH_FUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(.*)::h[a-f0-9]{16}$
    ",
    )
    .unwrap()
});

/// Frames from these modules are never reported.
const SKIPPED_MODULES: &[&str] = &["lantern_core::", "backtrace::", "std::", "core::", "__rust_"];

/// Captures the current backtrace as a list of `function (file:line)` lines.
pub fn current_backtrace() -> Vec<String> {
    backtrace_to_lines(&Backtrace::new())
}

/// Converts a backtrace into readable lines, innermost frame first.
pub fn backtrace_to_lines(bt: &Backtrace) -> Vec<String> {
    bt.frames()
        .iter()
        .flat_map(|frame| frame.symbols())
        .filter_map(|symbol| {
            let name = symbol.name()?.to_string();
            let name = strip_hash(&name);
            if SKIPPED_MODULES.iter().any(|module| name.starts_with(module)) {
                return None;
            }
            Some(match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(line)) => format!("{} ({}:{})", name, file.display(), line),
                _ => name.to_owned(),
            })
        })
        .collect()
}

fn strip_hash(name: &str) -> &str {
    HASH_FUNC_RE
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map_or(name, |m| m.as_str())
}

#[test]
fn test_strip_hash() {
    assert_eq!(
        strip_hash("my_app::handler::h0123456789abcdef"),
        "my_app::handler"
    );
    assert_eq!(strip_hash("my_app::handler"), "my_app::handler");
}
