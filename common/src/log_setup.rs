use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

/// Starts file logging under `logs/` with console duplication.
///
/// `base_level` uses the `RUST_LOG`-style spec, e.g. `"info"` or
/// `"warn, shadergraph=debug"`. Keep the returned handle alive for as long as
/// logging is needed.
pub fn setup_logging(base_level: &str) -> anyhow::Result<LoggerHandle> {
    let handle = Logger::try_with_env_or_str(base_level)?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .basename("shadergraph"),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .duplicate_to_stdout(Duplicate::All)
        .rotate(
            Criterion::Size(1024 * 1024), //1MB
            Naming::Timestamps,
            Cleanup::KeepLogFiles(5),
        )
        .start()?;

    Ok(handle)
}
