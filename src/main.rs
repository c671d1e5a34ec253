mod cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let command_line_interface = cli::CommandLineInterface::load();
    match command_line_interface.run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            use colored::Colorize;
            eprintln!("{} {error:#}", "error:".red().bold());
            std::process::exit(2);
        }
    }
}
