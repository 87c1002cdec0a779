//! ResNet-50 inference benchmark.

use env_logger::Env;
use log::error;

use widthnet::run_example;
use widthnet::topologies::ResNet50;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run_example(&ResNet50, std::env::args_os()) {
        error!("{}", e);
        std::process::exit(1);
    }
}
