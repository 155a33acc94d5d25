use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use wharf_cli::commands;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a site's content to a release version
    Deploy {
        #[arg(long, default_value = ".")]
        project_root: Utf8PathBuf,
        #[arg(
            long,
            default_value = "public",
            help = "Content directory, resolved against the project root"
        )]
        public: Utf8PathBuf,
        #[arg(long, help = "Target version identifier understood by the store")]
        version: String,
        #[arg(long, env = "WHARF_API_URL", help = "Release store version-API prefix")]
        api_url: String,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
        #[arg(long, default_value_t = 9)]
        gzip_level: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    match cli.command {
        Commands::Deploy {
            project_root,
            public,
            version,
            api_url,
            batch_size,
            gzip_level,
        } => {
            commands::cmd_deploy(
                project_root,
                public,
                version,
                api_url,
                batch_size,
                gzip_level,
                cli.verbose,
            )
            .await?;
        }
    }

    Ok(())
}
