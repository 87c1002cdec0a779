//! VGG16 inference benchmark, 0.125 width by default. See `--help`.

use env_logger::Env;
use log::error;

use widthnet::run_example;
use widthnet::topologies::Vgg16;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run_example(&Vgg16, std::env::args_os()) {
        error!("{}", e);
        std::process::exit(1);
    }
}
