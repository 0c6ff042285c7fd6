fn main() {
    let args = std::env::args();
    // Initialize logging as early as possible; fallback to stderr on failure.
    let _ = pbktrack::logging::init_logging(pbktrack::logging::LogFormat::Human);

    if let Err(err) = pbktrack::run(args) {
        eprintln!("pbktrack error: {err:#}");
        std::process::exit(1);
    }
}
