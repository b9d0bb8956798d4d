//! Compiled-in plugin modules and the link-time catalog.

use linkme::distributed_slice;

use super::registrar::PluginRegistrar;
use crate::error::BoxError;

/// Registration function of a plugin module.
///
/// Runs synchronously during the load phase and must not block on I/O.
pub type RegisterFn = fn(&mut PluginRegistrar<'_>) -> Result<(), BoxError>;

/// A plugin module: metadata plus the function that registers its handlers.
#[derive(Clone, Copy)]
pub struct PluginModule {
    /// Name that manifests refer to.
    pub name: &'static str,
    pub desc: &'static str,
    pub version: &'static str,
    pub register: RegisterFn,
}

impl PluginModule {
    pub const fn new(name: &'static str, register: RegisterFn) -> Self {
        Self {
            name,
            desc: "",
            version: "",
            register,
        }
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Every plugin module linked into the binary, in link order.
///
/// Populated by [`define_plugin!`](crate::define_plugin).
#[distributed_slice]
pub static PLUGIN_CATALOG: [PluginModule];

/// Looks a module up by name.
pub fn find_module(name: &str) -> Option<&'static PluginModule> {
    PLUGIN_CATALOG.iter().find(|m| m.name == name)
}

/// Declares a plugin module and adds it to [`PLUGIN_CATALOG`].
///
/// ```rust,ignore
/// fn register(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
///     r.register(Registration::new(filter::command(["ping"]), ping))?;
///     Ok(())
/// }
///
/// define_plugin! {
///     pub static PING = {
///         name: "ping",
///         desc: "Answers /ping",
///         register: register,
///     };
/// }
/// ```
#[macro_export]
macro_rules! define_plugin {
    (
        $(#[$meta:meta])*
        $vis:vis static $ident:ident = {
            name: $name:literal,
            $(desc: $desc:literal,)?
            $(version: $version:literal,)?
            register: $register:expr $(,)?
        };
    ) => {
        $(#[$meta])*
        #[$crate::plugin::__linkme::distributed_slice($crate::plugin::PLUGIN_CATALOG)]
        #[linkme(crate = $crate::plugin::__linkme)]
        $vis static $ident: $crate::plugin::PluginModule = $crate::plugin::PluginModule {
            name: $name,
            desc: $crate::__plugin_field!($($desc)?; ""),
            version: $crate::__plugin_field!($($version)?; ::std::env!("CARGO_PKG_VERSION")),
            register: $register,
        };
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __plugin_field {
    ($value:expr; $default:expr) => {
        $value
    };
    (; $default:expr) => {
        $default
    };
}
