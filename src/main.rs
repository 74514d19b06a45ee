use keysinger::cli::run_cli;

fn main() {
    env_logger::init();

    if let Err(e) = run_cli() {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
