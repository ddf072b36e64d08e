use clap::{Parser, Subcommand};
use iproto_store::client::Client;
use iproto_store::config;
use iproto_store::store::Mode;
use iproto_store::Error;

#[derive(Parser, Debug)]
#[command(name = "iproto-cli")]
#[command(about = "CLI for the iproto store")]
struct Args {
    /// Server address
    #[arg(short, long, env = "IPROTO_ADDRESS", default_value = config::DEFAULT_ADDRESS)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Switch the store mode: maintenance, read-only or read-write
    Mode { mode: Mode },

    /// Replace the value at an index
    Write { index: i64, value: String },

    /// Read the value at an index
    Read { index: i64 },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    let mut client = Client::new(args.server);

    let response = match args.command {
        Commands::Mode { mode } => client.set_mode(mode).await?,
        Commands::Write { index, value } => client.write(index, &value).await?,
        Commands::Read { index } => client.read(index).await?,
    };

    if response.is_ok() {
        println!("{}", response.body);
    } else {
        eprintln!("error {}: {}", response.return_code, response.body);
        std::process::exit(1);
    }

    Ok(())
}
