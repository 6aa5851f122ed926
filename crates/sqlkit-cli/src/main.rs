fn main() {
    if let Err(e) = sqlkit_cli::run(std::env::args().collect()) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
