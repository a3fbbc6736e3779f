use anyhow::Result;

fn main() -> Result<()> {
    let code = genverify::cli::run()?;
    std::process::exit(code);
}
