use secrecy::SecretString;

pub mod server;

/// SMTP relay settings; `None` host means emails are logged instead of sent.
#[derive(Debug)]
pub struct SmtpArgs {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        token_secret: SecretString,
        base_url: String,
        smtp: SmtpArgs,
    },
}
