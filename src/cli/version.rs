/// Display version information
pub fn execute() {
    println!("groupd {}", env!("CARGO_PKG_VERSION"));
    println!("Group management and identity trust daemon");
}
