use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// JSON logs by default; `LOG_FORMAT=pretty` switches to human-readable output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,actix_web=info,reqwest=warn"));

    let pretty = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("pretty"));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_ansi(pretty);

    let registry = tracing_subscriber::registry().with(env_filter);
    if pretty {
        registry.with(fmt_layer).init();
    } else {
        registry.with(fmt_layer.json()).init();
    }
}
