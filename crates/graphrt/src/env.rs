use std::env;
use std::sync::OnceLock;

static LOG_VERBOSITY: OnceLock<Option<u8>> = OnceLock::new();
static PROFILE: OnceLock<Option<bool>> = OnceLock::new();
static DISABLE_MEMORY_REUSE: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn read(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn log_verbosity() -> Option<u8> {
    *LOG_VERBOSITY.get_or_init(|| read("GRAPHRT_LOG_VERBOSITY").and_then(|value| value.trim().parse().ok()))
}

pub(crate) fn profiling() -> Option<bool> {
    *PROFILE.get_or_init(|| read("GRAPHRT_PROFILE").map(|value| parse_bool(&value)))
}

pub(crate) fn memory_reuse_disabled() -> bool {
    *DISABLE_MEMORY_REUSE.get_or_init(|| {
        read("GRAPHRT_DISABLE_MEMORY_REUSE").is_some_and(|value| parse_bool(&value))
    })
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn accepts_common_truthy_spellings() {
        for value in ["1", "true", " YES ", "on"] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "off", ""] {
            assert!(!parse_bool(value), "{value}");
        }
    }
}
