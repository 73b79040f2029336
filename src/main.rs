use gogish::{Config, Interpreter};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GOGISH_LOG").unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    println!("Welcome to GoGiShell!");
    println!("Type 'help' to read the manual.");
    println!();

    Interpreter::new(config)?.repl()?;

    println!("Thank you for using GoGiShell!");
    Ok(())
}
