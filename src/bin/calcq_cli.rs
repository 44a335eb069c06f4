use std::{error::Error, io};

use calcq::{
    cli::CliError,
    prompt,
    protocol::{Client, Response, ResponseCode},
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address, e.g. 127.0.0.1:54321
    address: String,
    /// Username presented to the server
    username: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut client = Client::connect(cli.address.as_str())?;

    if client.establish(&cli.username)? == ResponseCode::BadRequest {
        eprintln!("server rejected username '{}'", cli.username);
    }

    loop {
        let cmd = match prompt(io::stdin().lock(), io::stdout().lock()) {
            Ok(c) => c,
            Err(CliError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match client.submit(cmd)? {
            Response::Calculation(resp) if resp.is_failure() => {
                println!("{} ({})", resp.result, resp.error)
            }
            Response::Calculation(resp) => println!("{}", resp.result),
            Response::ConnectionTerminate { .. } => break,
            resp if resp.code() == ResponseCode::BadRequest => eprintln!("bad request"),
            resp => eprintln!("unexpected reply: {resp:?}"),
        }
    }

    Ok(())
}
