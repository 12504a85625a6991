//! Prints the private key of a downloaded service account file as a JSON
//! string literal, ready to paste into `.env` as `GOOGLE_PRIVATE_KEY`.

use std::{env, path::PathBuf, process};

use stock_sheet_sync::{google::credentials, logging};

const GOOGLE_CREDENTIALS_FILE: &str = "GOOGLE_CREDENTIALS_FILE";
const DEFAULT_CREDENTIALS_FILE: &str = "client_secret.json";

fn main() {
    dotenv::dotenv().ok();

    let path = env::var(GOOGLE_CREDENTIALS_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CREDENTIALS_FILE));

    match credentials::export_private_key_from_file(&path) {
        Ok(literal) => println!("{}", literal),
        Err(why) => {
            logging::error_console(why.to_string());
            process::exit(1);
        }
    }
}
