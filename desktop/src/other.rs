pub fn prepare_process() -> anyhow::Result<()> {
    Ok(())
}
