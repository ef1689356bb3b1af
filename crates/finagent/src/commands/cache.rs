use super::Workspace;

pub fn run_sweep() -> anyhow::Result<()> {
    let cache = Workspace::load()?.cache()?;
    let removed = cache.sweep_expired();
    println!("Removed {removed} expired entries");
    Ok(())
}

pub fn run_clear() -> anyhow::Result<()> {
    let cache = Workspace::load()?.cache()?;
    let removed = cache.clear();
    println!("Cleared {removed} cached responses");
    Ok(())
}
