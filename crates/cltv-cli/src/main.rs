mod command;
mod data;
mod logging;
mod util;

fn main() -> anyhow::Result<()> {
    logging::init();
    command::run()
}
