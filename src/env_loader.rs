use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(fair_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(fair_home) = fair_home {
        return Some(fair_home.join(".env"));
    }
    Some(home_dir?.join(".fairtool/.env"))
}

/// `.env` from the working directory, else from the fairtool home.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("FAIR_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
