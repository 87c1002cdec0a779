//! GoogLeNet inference benchmark, 0.25 width by default.

use env_logger::Env;
use log::error;

use widthnet::run_example;
use widthnet::topologies::GoogLeNet;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run_example(&GoogLeNet, std::env::args_os()) {
        error!("{}", e);
        std::process::exit(1);
    }
}
