use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use toml_edit::{value, DocumentMut};

pub static CONFIG: Lazy<LinkConfig> = Lazy::new(|| LinkConfig::load("Config.toml"));

trait ConfigSerializeDefault {
    fn fix_config(self, name: &str, doc: &mut DocumentMut);
}

macro_rules! impl_simple_default {
    ( $( $type:ty ),* ) => {
        $(
            impl ConfigSerializeDefault for $type {
                fn fix_config(self, name: &str, doc: &mut DocumentMut) {
                    doc.entry(name).or_insert_with(|| value(self));
                }
            }
        )*
    }
}

impl_simple_default!(String, i64, bool);

impl<T> ConfigSerializeDefault for Option<T> {
    fn fix_config(self, _: &str, _: &mut DocumentMut) {
        assert!(matches!(self, None), "`Some` as default is unimplemented");
    }
}

macro_rules! gen_config {
    (
        $( $name:ident: $type:ty = $default:expr),*
    ) => {
        #[derive(Serialize, Deserialize)]
        pub struct LinkConfig {
            $(
                pub $name: $type,
            )*
        }

        impl LinkConfig {
            fn load(config_file: &str) -> LinkConfig {
                let str = fs::read_to_string(config_file).unwrap_or_default();
                let mut doc = str.parse::<DocumentMut>().unwrap();

                $(
                    <$type as ConfigSerializeDefault>::fix_config($default, stringify!($name), &mut doc);
                )*

                let patched = doc.to_string();
                if str != patched {
                    let mut file = fs::OpenOptions::new().create(true).write(true).open(&config_file).unwrap();
                    write!(file, "{}", patched).unwrap();
                }

                toml::from_str(&patched).unwrap()
            }
        }
    };
}

gen_config! {
    link_path: String = "/dev/shm/vclink".to_string(),
    max_links: i64 = 64,
    position_publish_ms: i64 = 50,
    voip: Option<VoipConfig> = None
}

/// Optional VoIP server coordinates. When set, a connection URL is logged
/// for every joining player.
#[derive(Serialize, Deserialize, Clone)]
pub struct VoipConfig {
    pub host: String,
    pub port: i64,
    pub path: Option<String>,
}

impl VoipConfig {
    /// Builds the `mumble://` URL a player's voice client should open.
    /// The player name becomes the URL userinfo.
    pub fn client_url(&self, username: &str) -> String {
        let mut url = format!("mumble://{}@{}:{}", username, self.host, self.port);
        if let Some(path) = &self.path {
            url.push('/');
            url.push_str(path.trim_start_matches('/'));
        }
        url
    }
}
