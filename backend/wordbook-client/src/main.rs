use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};
use secure_string::SecureString;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use wordbook_client::{client::WordbookClient, views};

/// Manage wordbooks and take quizzes from the terminal.
#[derive(Parser, Debug)]
struct Cli {
    /// The url of the wordbook API.
    #[arg(long, default_value = "http://localhost:8093")]
    url: String,

    /// The name of the user.
    #[arg(short, long)]
    username: String,

    /// The password of the user.
    /// If not given, then it is read from the first line of stdin.
    #[arg(short, long)]
    password: Option<SecureString>,

    /// Create the account before logging in.
    #[arg(long)]
    create_account: bool,
}

fn initialise_logging() -> anyhow::Result<()> {
    TermLogger::init(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("cannot initialise logging")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    initialise_logging()?;
    let cli = Cli::parse();

    // The password and the commands are read through the same buffer.
    let mut lines = BufReader::new(stdin()).lines();
    let password = if let Some(password) = cli.password {
        password
    } else {
        let line = lines
            .next_line()
            .await
            .context("cannot read password from stdin")?
            .context("stdin ended before the password")?;
        SecureString::from(line)
    };

    let client = WordbookClient::new(cli.url)?;
    if cli.create_account {
        client.create_account(&cli.username, &password).await?;
        info!("Created account {:?}", cli.username);
    }
    client.login(&cli.username, &password).await?;
    info!("Logged in as {:?}", cli.username);

    // Returns after the last quiz answer was sent.
    views::run(&client, &mut lines).await?;

    client.logout().await?;
    Ok(())
}
