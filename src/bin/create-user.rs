//! Create an account (or reset an existing one by email) from the shell.
//!
//! Usage: create-user <USERNAME> <EMAIL> <PASSWORD> [user|admin]

use novelread_backend::db::{
    self,
    models::{NewUser, Role},
};
use novelread_backend::routes::auth::{check_email, check_password, check_username, hash_password};
use std::env;
use std::process::exit;

fn usage() -> ! {
    eprintln!("Usage: cargo run --bin create-user <USERNAME> <EMAIL> <PASSWORD> [user|admin]");
    exit(1);
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let (username, email, password) = match args.as_slice() {
        [u, e, p] | [u, e, p, _] => (u.trim().to_string(), e.trim().to_lowercase(), p.clone()),
        _ => usage(),
    };
    let role: Role = match args.get(3).map(|r| r.parse::<Role>()) {
        None => Role::User,
        Some(Ok(role)) => role,
        Some(Err(e)) => {
            eprintln!("{}", e);
            usage();
        }
    };

    let mut errors = Vec::new();
    check_username(&username, &mut errors);
    check_email(&email, &mut errors);
    check_password("password", &password, &mut errors);
    if !errors.is_empty() {
        for error in errors {
            eprintln!("{}: {}", error.field, error.message);
        }
        exit(1);
    }

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Cannot connect to the database: {}", e);
            exit(1);
        }
    };
    if let Err(e) = db::run_migrations(&pool).await {
        eprintln!("Cannot prepare the schema: {}", e);
        exit(1);
    }

    let password_hash = match hash_password(password).await {
        Ok(hash) => hash,
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            exit(1);
        }
    };

    let new_user = NewUser {
        username,
        email,
        password_hash,
        role,
    };
    match db::users::upsert(&pool, &new_user).await {
        Ok(user) => {
            println!("\nId       : {}", user.id);
            println!("Username : {}", user.username);
            println!("Email    : {}", user.email);
            println!("Role     : {}\n", user.role);
        }
        Err(e) => {
            eprintln!("Error saving user: {}", e);
            exit(1);
        }
    }
}
