use anyhow::Result;

pub fn main() -> Result<()> {
    std::process::exit(windisplay::run()?)
}
