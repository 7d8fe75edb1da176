//! Tracing subscriber setup for the command-line tool.

use tracing_subscriber::EnvFilter;

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "resift=warn",
        1 => "resift=info",
        2 => "resift=debug",
        _ => "resift=trace",
    }
}

/// Install a formatted subscriber writing to stderr.
///
/// `RUST_LOG`, when set, takes precedence over `verbosity`. Calling this
/// twice is harmless; the second call leaves the first subscriber in place.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_directive(0), "resift=warn");
        assert_eq!(default_directive(1), "resift=info");
        assert_eq!(default_directive(9), "resift=trace");
    }

    #[test]
    fn init_is_idempotent() {
        init(1);
        init(2);
    }
}
