use clap::Parser;

#[derive(Parser)]
#[command(
    name = "modelgate",
    about = "Modelgate Server - AI admission-control gateway",
    version = env!("CARGO_PKG_VERSION"),
    author
)]
pub struct Cli {
    #[arg(short, long, env = "MODELGATE_PORT", default_value = "8090")]
    pub port: u16,

    #[arg(long, env = "MODELGATE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}
