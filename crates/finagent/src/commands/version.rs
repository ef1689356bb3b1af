pub fn run() -> anyhow::Result<()> {
    println!("finagent {}", env!("CARGO_PKG_VERSION"));
    println!("Supervising dispatcher for banking knowledge and marketing queries");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_output() {
        let result = run();
        assert!(result.is_ok());
    }
}
