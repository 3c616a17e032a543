use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tkge_negatives::example_apps::run_sampling_demo(std::env::args().skip(1))
}
