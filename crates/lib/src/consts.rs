/// Application name, used for the log file and environment variable prefixes.
pub const APP_NAME: &str = "uvbuild";

/// Log file appended to in the working directory on every build.
pub const LOG_FILENAME: &str = "uvbuild.log";

/// File passed to UV4 via `-o`; µVision writes its build listing there.
pub const TOOL_OUTPUT_FILENAME: &str = "uvbuild.uv4.txt";

/// Optional policy file read from the working directory.
pub const CONFIG_FILENAME: &str = "uvbuild.json";

/// Environment variable overriding the UV4 executable path.
pub const UV4_ENV: &str = "UVBUILD_UV4";

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "UVBUILD_CONFIG";

/// Project file extensions, current format first.
pub const PROJECT_EXTENSIONS: [&str; 2] = ["uvprojx", "uvproj"];
