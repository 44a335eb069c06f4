use std::{
    error::Error,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    process,
};

use calcq::{logging, protocol::CalculationServer};
use clap::Parser;
use log::info;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to accept connections on
    #[arg(value_parser = clap::value_parser!(u16).range(1024..))]
    port: u16,
    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,
    /// Append log output to this file as well as stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_file.as_deref())?;

    ctrlc::set_handler(|| {
        info!("interrupted, shutting down");
        process::exit(0);
    })?;

    let server = CalculationServer::bind(SocketAddr::new(cli.host, cli.port))?;
    server.listen()?;
    Ok(())
}
