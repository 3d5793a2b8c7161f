use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use streamfs::fuse::mount::mount_streamfs;
use streamfs::{Config, RedisGateway, StreamFs};

#[derive(Parser)]
#[command(name = "streamfs", version, about = "Redis keys and streams as a FUSE filesystem")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount the store namespace via FUSE.
    Mount(MountArgs),
}

#[derive(Args)]
struct MountArgs {
    /// Directory to mount the filesystem on.
    #[arg(value_name = "MOUNT_POINT")]
    mount_point: PathBuf,

    /// Backing store endpoint, e.g. redis://127.0.0.1:6379.
    #[arg(long, value_name = "URL")]
    redis_url: Option<String>,

    /// Configuration file (YAML); defaults to the standard search path.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "streamfs=info".to_string()))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Mount(args) => mount_cmd(args).await?,
    }

    Ok(())
}

async fn mount_cmd(args: MountArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_default_path()?,
    };
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }

    if !args.mount_point.is_dir() {
        anyhow::bail!("mount point must be a directory");
    }

    let gateway = RedisGateway::connect(&config.redis_url).await?;
    let fs = StreamFs::new(gateway, config.attr_ttl());
    let handle = mount_streamfs(fs, &config, &args.mount_point).await?;

    println!("mounted at {}", args.mount_point.display());
    tokio::signal::ctrl_c().await?;
    println!("unmounting...");
    handle.unmount().await?;
    Ok(())
}
