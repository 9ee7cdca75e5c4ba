//! Admin user management commands.
//!
//! These open the gateway database directly, so they cannot run while the
//! server holds it.

use anyhow::{Context, Result, anyhow};
use evently_core::{Config, validate_email, validate_name, validate_password};
use evently_gateway::auth::{NewUser, User, UserRole, UserStore, UserUpdate};
use evently_gateway::{Gateway, GatewayState};
use rand::seq::SliceRandom;

use crate::ui;

/// Admin actions.
#[derive(Debug, Clone)]
pub enum AdminAction {
    /// Create a user.
    Create {
        name: String,
        email: String,
        password: Option<String>,
        generate_password: bool,
        role: String,
        creator: bool,
    },
    /// List all users.
    List,
    /// Grant the admin role.
    Promote { email: String },
    /// Set the creator flag.
    SetCreator { email: String, value: bool },
    /// Delete a user and their favorites.
    Delete { email: String },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the database cannot be opened or the operation fails.
pub async fn run_admin(config: Config, action: AdminAction) -> Result<()> {
    let gateway = Gateway::new(config).context("Failed to open gateway data (is the server running?)")?;
    let state = gateway.state();
    tracing::debug!(data_dir = %gateway.config().gateway.data_dir().display(), "Opened gateway data");

    match action {
        AdminAction::Create {
            name,
            email,
            password,
            generate_password: generate,
            role,
            creator,
        } => create_user(state, &name, &email, password, generate, &role, creator).await,
        AdminAction::List => list_users(state).await,
        AdminAction::Promote { email } => {
            let user = find_user(state, &email).await?;
            update_user(
                state,
                &user,
                UserUpdate {
                    role: Some(UserRole::Admin),
                    ..UserUpdate::default()
                },
            )
            .await?;
            ui::success(&format!("{email} is now an admin"));
            Ok(())
        }
        AdminAction::SetCreator { email, value } => {
            let user = find_user(state, &email).await?;
            update_user(
                state,
                &user,
                UserUpdate {
                    is_creator: Some(value),
                    ..UserUpdate::default()
                },
            )
            .await?;
            ui::success(&format!("Creator flag for {email} set to {value}"));
            Ok(())
        }
        AdminAction::Delete { email } => {
            let user = find_user(state, &email).await?;
            state
                .auth
                .store()
                .delete(&user.id)
                .await
                .map_err(|e| anyhow!("Failed to delete user: {e}"))?;
            let favorites = state
                .favorites
                .remove_all_for_user(&user.id)
                .map_err(|e| anyhow!("Failed to delete favorites: {e}"))?;
            ui::success(&format!("Deleted {email} and {favorites} favorite(s)"));
            Ok(())
        }
    }
}

async fn find_user(state: &GatewayState, email: &str) -> Result<User> {
    state
        .auth
        .store()
        .find_by_email(email.trim())
        .await
        .map_err(|e| anyhow!("Failed to look up user: {e}"))?
        .ok_or_else(|| anyhow!("No user with email '{email}'"))
}

async fn update_user(state: &GatewayState, user: &User, changes: UserUpdate) -> Result<()> {
    state
        .auth
        .store()
        .update(&user.id, changes)
        .await
        .map_err(|e| anyhow!("Failed to update user: {e}"))?;
    Ok(())
}

async fn create_user(
    state: &GatewayState,
    name: &str,
    email: &str,
    password: Option<String>,
    generate: bool,
    role: &str,
    creator: bool,
) -> Result<()> {
    let role: UserRole = role.parse()?;
    let name = validate_name(name)?;
    let email = validate_email(email)?;

    let password = if generate {
        let generated = generate_password(16);
        ui::success(&format!("Generated password: {generated}"));
        generated
    } else {
        password.ok_or_else(|| anyhow!("Password required. Use --password or --generate-password"))?
    };
    validate_password(&password)?;

    let password_hash = state
        .auth
        .hasher()
        .hash_blocking(password)
        .await
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

    let user = state
        .auth
        .store()
        .create(NewUser {
            password_hash: Some(password_hash),
            role,
            is_creator: creator,
            ..NewUser::regular(name, email)
        })
        .await
        .map_err(|e| anyhow!("Failed to create user: {e}"))?;

    ui::success(&format!(
        "Created user '{}' ({}) with role {}",
        user.name, user.email, user.role
    ));
    Ok(())
}

async fn list_users(state: &GatewayState) -> Result<()> {
    let users = state
        .auth
        .store()
        .list()
        .await
        .map_err(|e| anyhow!("Failed to list users: {e}"))?;

    if users.is_empty() {
        ui::info("No users yet.");
        ui::info("Run 'evently admin create --name Admin --email you@example.com --generate-password --role admin'.");
        return Ok(());
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!(
        "{:<32} {:<24} {:<6} {:<8} {:<8} {:<20}",
        "EMAIL", "NAME", "ROLE", "CREATOR", "LOGIN", "CREATED"
    );
    for user in users {
        let login = if user.password_hash.is_some() {
            "password"
        } else {
            "oauth"
        };
        println!(
            "{:<32} {:<24} {:<6} {:<8} {:<8} {:<20}",
            user.email,
            user.name,
            user.role.to_string(),
            if user.is_creator { "yes" } else { "no" },
            login,
            user.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";

/// Random password that satisfies the password policy.
fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();

    let mut chars: Vec<u8> = [UPPER, DIGITS, SYMBOLS]
        .iter()
        .filter_map(|set| set.choose(&mut rng).copied())
        .collect();
    while chars.len() < length.max(8) {
        if let Some(c) = all.choose(&mut rng) {
            chars.push(*c);
        }
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}
