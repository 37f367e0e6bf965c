use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_LOCALE: &str = "en-US";
const GENERATED_FILE: &str = "calmform_i18n_generated.rs";

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let locales_dir = manifest_dir.join("locales");
    println!("cargo:rerun-if-changed={}", locales_dir.display());

    let mut locales = BTreeMap::new();
    for entry in fs::read_dir(&locales_dir).expect("read locales directory") {
        let path = entry.expect("locale entry").path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        println!("cargo:rerun-if-changed={}", path.display());
        let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        locales.insert(locale.to_string(), load_locale(&path));
    }

    if !locales.contains_key(DEFAULT_LOCALE) {
        println!("cargo:warning=default locale {DEFAULT_LOCALE} has no catalog file");
    }

    let mut output = String::new();
    writeln!(output, "pub const DEFAULT_LOCALE: &str = {DEFAULT_LOCALE:?};").expect("write");
    writeln!(output, "pub static LOCALES: &[(&str, &[(&str, &str)])] = &[").expect("write");
    for (locale, entries) in &locales {
        writeln!(output, "    ({locale:?}, &[").expect("write");
        for (key, value) in entries {
            writeln!(output, "        ({key:?}, {value:?}),").expect("write");
        }
        writeln!(output, "    ]),").expect("write");
    }
    writeln!(output, "];").expect("write");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    fs::write(out_dir.join(GENERATED_FILE), output).expect("write generated catalog");
}

fn load_locale(path: &Path) -> BTreeMap<String, String> {
    let text = fs::read_to_string(path).expect("read locale file");
    let table: toml::Table = toml::from_str(&text)
        .unwrap_or_else(|error| panic!("invalid locale file {}: {error}", path.display()));
    let mut entries = BTreeMap::new();
    flatten("", &table, &mut entries);
    entries
}

// Nested tables become dotted keys: `[rules] gt = ".."` is `rules.gt`.
fn flatten(prefix: &str, table: &toml::Table, entries: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(text) => {
                entries.insert(full_key, text.clone());
            }
            toml::Value::Table(nested) => flatten(&full_key, nested, entries),
            other => panic!("unsupported value for {full_key}: {other}"),
        }
    }
}
