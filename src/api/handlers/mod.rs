pub mod health;
pub mod provider;
pub mod session;
pub mod signin;
pub mod signup;
pub mod types;
mod utils;
