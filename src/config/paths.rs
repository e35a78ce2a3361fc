use std::path::PathBuf;

pub fn config_dir() -> PathBuf {
    PathBuf::from("/etc/hookci")
}

pub fn global_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn data_dir() -> PathBuf {
    PathBuf::from("/var/lib/hookci")
}

pub fn database_path() -> PathBuf {
    data_dir().join("build_history.db")
}

pub fn work_dir() -> PathBuf {
    data_dir().join("to_build")
}
