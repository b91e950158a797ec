fn main() -> anyhow::Result<()> {
    binsync_observability::init();

    let options = binsync_runner::RunOptions::from_env(std::env::args().nth(1))?;
    let summary = binsync_runner::run(&options)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
