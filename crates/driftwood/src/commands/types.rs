use colored::Colorize;

pub fn handle() {
    println!("{}", "Supported resource types:".bold());
    for resource_type in driftwood_resources::resource_types() {
        println!("  {}", resource_type.cyan());
    }
}
