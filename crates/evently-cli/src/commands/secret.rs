//! Secret command - generate token signing secrets.

use evently_gateway::auth::TokenIssuer;

use crate::ui;

/// Print a fresh access/refresh secret pair as a config snippet.
pub fn run_secret() {
    let access = TokenIssuer::generate_hex_secret();
    let refresh = TokenIssuer::generate_hex_secret();

    ui::info("Add this to the \"auth\" section of evently.json:");
    println!();
    println!("  accessSecret: \"{access}\",");
    println!("  refreshSecret: \"{refresh}\",");
    println!();
    ui::dim("Or export EVENTLY_ACCESS_SECRET and EVENTLY_REFRESH_SECRET.");
}
