use std::io::Write;

pub const LOG_ENV: &str = "FAIR_LOG";

fn verbosity_filter(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Logs go to stderr so `--json` reports on stdout stay parseable.
/// `-v` flags take precedence over `FAIR_LOG`, which defaults to `info`.
pub fn init(verbose: u8) {
    let env = env_logger::Env::default().filter_or(LOG_ENV, "info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = verbosity_filter(verbose) {
        builder.parse_filters(filter);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);
    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::verbosity_filter;

    #[test]
    fn verbose_flags_raise_the_level() {
        assert_eq!(verbosity_filter(0), None);
        assert_eq!(verbosity_filter(1), Some("debug"));
        assert_eq!(verbosity_filter(3), Some("trace"));
    }
}
