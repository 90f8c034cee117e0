use groupd::protocol::{docs, Registry};

/// Print the operation reference as JSON
pub fn execute() -> Result<(), Box<dyn std::error::Error>> {
    let doc = docs::render(&Registry::new());
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
