//! Route configuration: which routes require HMAC, with which selector and
//! adapter.
//!
//! The configuration is plain data, usually deserialized from JSON:
//!
//! ```json
//! {
//!   "default_selector": "main",
//!   "default_adapter": "HMACHeaderAdapter",
//!   "selectors": { "main": "partners" },
//!   "controllers": {
//!     "/orders": {
//!       "collection": {
//!         "POST": { "selector": "main", "adapter": "HMACUriAdapter" },
//!         "GET": false
//!       },
//!       "entity": false
//!     },
//!     "/health": false
//!   }
//! }
//! ```
//!
//! `false` at any level disables HMAC for that scope. Selector and adapter
//! fall back independently: method, plurality, controller, then the
//! defaults. A controller that is not listed gets the defaults.

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::ConfigurationError;

/// A config node that is either `false`/`true` or a nested rule.
///
/// `true` behaves like an empty rule: everything is inherited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Toggle<T> {
    /// `false` disables HMAC for the scope.
    Flag(bool),
    /// Overrides for the scope.
    Rule(T),
}

impl<T> Toggle<T> {
    fn rule(&self) -> Result<Option<&T>, Disabled> {
        match self {
            Toggle::Flag(false) => Err(Disabled),
            Toggle::Flag(true) => Ok(None),
            Toggle::Rule(rule) => Ok(Some(rule)),
        }
    }
}

struct Disabled;

/// Overrides for one HTTP method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MethodRule {
    /// Selector override.
    #[serde(default)]
    pub selector: Option<String>,
    /// Adapter override.
    #[serde(default)]
    pub adapter: Option<String>,
}

/// Overrides for one plurality (`collection` or `entity`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PluralityRule {
    /// Selector override.
    #[serde(default)]
    pub selector: Option<String>,
    /// Adapter override.
    #[serde(default)]
    pub adapter: Option<String>,
    /// Per-method rules, keyed by method name.
    #[serde(flatten)]
    pub methods: HashMap<String, Toggle<MethodRule>>,
}

/// Overrides for one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ControllerRule {
    /// Selector override.
    #[serde(default)]
    pub selector: Option<String>,
    /// Adapter override.
    #[serde(default)]
    pub adapter: Option<String>,
    /// Per-plurality rules, keyed by plurality name.
    #[serde(flatten)]
    pub pluralities: HashMap<String, Toggle<PluralityRule>>,
}

/// Server-side HMAC route configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HmacServerConfig {
    /// Selector used when no rule sets one.
    #[serde(default)]
    pub default_selector: Option<String>,

    /// Adapter used when no rule sets one.
    #[serde(default)]
    pub default_adapter: Option<String>,

    /// Selector name to key provider entry. `null` or `""` is unmapped.
    #[serde(default)]
    pub selectors: HashMap<String, Option<String>>,

    /// Per-controller rules.
    #[serde(default)]
    pub controllers: HashMap<String, Toggle<ControllerRule>>,
}

/// What a request is, as far as route configuration is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteIdentity {
    /// Controller (route) name.
    pub controller: String,
    /// `collection` or `entity`.
    pub plurality: String,
    /// HTTP method, upper case.
    pub method: String,
}

impl RouteIdentity {
    /// Create a route identity.
    pub fn new(
        controller: impl Into<String>,
        plurality: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            controller: controller.into(),
            plurality: plurality.into(),
            method: method.into(),
        }
    }
}

/// Raw lookup result, before names are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLookup<'a> {
    /// HMAC is switched off for this route.
    Disabled,
    /// Values found by walking the fallback chain.
    Values {
        /// Whether the controller is listed at all.
        listed: bool,
        /// Resolved selector name.
        selector: Option<&'a str>,
        /// Resolved adapter name.
        adapter: Option<&'a str>,
    },
}

/// Outcome of resolving a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing configured for the route.
    NotRequired,
    /// Explicitly disabled with `false`.
    Disabled,
    /// HMAC applies.
    Required {
        /// Selector name (not yet mapped to a provider entry).
        selector: String,
        /// Adapter name (not yet parsed).
        adapter: String,
    },
}

impl HmacServerConfig {
    /// Walk the method, plurality, controller, default chain.
    pub fn lookup(&self, route: &RouteIdentity) -> RuleLookup<'_> {
        let mut selector = None;
        let mut adapter = None;

        let listed = match self.controllers.get(&route.controller) {
            None => false,
            Some(controller) => {
                let Ok(controller) = controller.rule() else {
                    return RuleLookup::Disabled;
                };
                if let Some(controller) = controller {
                    if let Some(plurality) = controller.pluralities.get(&route.plurality) {
                        let Ok(plurality) = plurality.rule() else {
                            return RuleLookup::Disabled;
                        };
                        if let Some(plurality) = plurality {
                            if let Some(method) = plurality.methods.get(&route.method) {
                                let Ok(method) = method.rule() else {
                                    return RuleLookup::Disabled;
                                };
                                if let Some(method) = method {
                                    pick(&mut selector, &method.selector);
                                    pick(&mut adapter, &method.adapter);
                                }
                            }
                            pick(&mut selector, &plurality.selector);
                            pick(&mut adapter, &plurality.adapter);
                        }
                    }
                    pick(&mut selector, &controller.selector);
                    pick(&mut adapter, &controller.adapter);
                }
                true
            }
        };
        pick(&mut selector, &self.default_selector);
        pick(&mut adapter, &self.default_adapter);

        RuleLookup::Values {
            listed,
            selector,
            adapter,
        }
    }

    /// Decide whether HMAC applies to `route`, and with what.
    ///
    /// # Errors
    /// `MissingSelector` / `MissingAdapter` when HMAC applies but the chain
    /// yields no value.
    pub fn resolve(&self, route: &RouteIdentity) -> Result<Resolution, ConfigurationError> {
        let (listed, selector, adapter) = match self.lookup(route) {
            RuleLookup::Disabled => return Ok(Resolution::Disabled),
            RuleLookup::Values {
                listed,
                selector,
                adapter,
            } => (listed, selector, adapter),
        };

        if !listed && selector.is_none() && adapter.is_none() {
            return Ok(Resolution::NotRequired);
        }

        let selector =
            selector.ok_or_else(|| ConfigurationError::MissingSelector(route.controller.clone()))?;
        let adapter =
            adapter.ok_or_else(|| ConfigurationError::MissingAdapter(route.controller.clone()))?;
        Ok(Resolution::Required {
            selector: selector.to_owned(),
            adapter: adapter.to_owned(),
        })
    }

    /// Map a selector name to its key provider entry.
    pub fn provider_key(&self, selector: &str) -> Result<&str, ConfigurationError> {
        match self.selectors.get(selector) {
            None => Err(ConfigurationError::UnknownSelector(selector.to_owned())),
            Some(mapped) => non_empty(mapped)
                .ok_or_else(|| ConfigurationError::UnmappedSelector(selector.to_owned())),
        }
    }
}

fn pick<'a>(slot: &mut Option<&'a str>, value: &'a Option<String>) {
    if slot.is_none() {
        *slot = non_empty(value);
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const LOCK: &str = "ApplicationManager\\V1\\Rest\\Lock\\Controller";

    fn config(controller: serde_json::Value) -> HmacServerConfig {
        serde_json::from_value(json!({
            "default_selector": "HMACSelectorDefault",
            "default_adapter": "HMACAdapterDefault",
            "controllers": { LOCK: controller }
        }))
        .unwrap()
    }

    fn required(selector: &str, adapter: &str) -> Resolution {
        Resolution::Required {
            selector: selector.into(),
            adapter: adapter.into(),
        }
    }

    fn route(plurality: &str, method: &str) -> RouteIdentity {
        RouteIdentity::new(LOCK, plurality, method)
    }

    #[test]
    fn test_method_level_rules() {
        let config = config(json!({
            "collection": {
                "POST": { "selector": "HMAC", "adapter": "HMACUriAdapter" },
                "GET": false
            },
            "entity": {
                "POST": { "selector": "HMAC", "adapter": "HMACUriAdapter" },
                "GET": false
            }
        }));

        assert_eq!(
            config.resolve(&route("collection", "POST")).unwrap(),
            required("HMAC", "HMACUriAdapter")
        );
        assert_eq!(
            config.resolve(&route("collection", "GET")).unwrap(),
            Resolution::Disabled
        );
        assert_eq!(
            config.resolve(&route("collection", "PATCH")).unwrap(),
            required("HMACSelectorDefault", "HMACAdapterDefault")
        );
    }

    #[test]
    fn test_plurality_level_rules() {
        let mut config = config(json!({
            "collection": { "selector": "HMAC", "adapter": "HMACUriAdapter" },
            "entity": false
        }));

        assert_eq!(
            config.resolve(&route("collection", "POST")).unwrap(),
            required("HMAC", "HMACUriAdapter")
        );
        assert_eq!(config.resolve(&route("entity", "POST")).unwrap(), Resolution::Disabled);

        let Some(Toggle::Rule(rule)) = config.controllers.get_mut(LOCK) else {
            panic!("controller rule expected");
        };
        rule.pluralities.remove("entity");
        assert_eq!(
            config.resolve(&route("entity", "POST")).unwrap(),
            required("HMACSelectorDefault", "HMACAdapterDefault")
        );
    }

    #[test]
    fn test_controller_level_rules() {
        let config_on = config(json!({ "selector": "HMAC", "adapter": "HMACUriAdapter" }));
        assert_eq!(
            config_on.resolve(&route("collection", "POST")).unwrap(),
            required("HMAC", "HMACUriAdapter")
        );

        let config_off = config(json!(false));
        assert_eq!(
            config_off.resolve(&route("collection", "POST")).unwrap(),
            Resolution::Disabled
        );

        // Unlisted controllers get the defaults
        let other = RouteIdentity::new("Controller\\Que\\Nao\\Existe", "collection", "POST");
        assert_eq!(
            config_off.resolve(&other).unwrap(),
            required("HMACSelectorDefault", "HMACAdapterDefault")
        );
    }

    #[test]
    fn test_selector_and_adapter_fall_back_independently() {
        let config = config(json!({
            "adapter": "HMACSessionHeaderAdapter",
            "collection": { "POST": { "selector": "S1" } }
        }));
        assert_eq!(
            config.resolve(&route("collection", "POST")).unwrap(),
            required("S1", "HMACSessionHeaderAdapter")
        );
    }

    #[test]
    fn test_no_defaults() {
        let config: HmacServerConfig = serde_json::from_value(json!({
            "controllers": { "C": { "collection": { "POST": { "selector": "S1" } } } }
        }))
        .unwrap();

        // Unlisted controller with no defaults: nothing to do
        let other = RouteIdentity::new("Other", "collection", "GET");
        assert_eq!(config.resolve(&other).unwrap(), Resolution::NotRequired);

        // Listed controller with an incomplete chain is a configuration error
        assert_eq!(
            config.resolve(&RouteIdentity::new("C", "collection", "POST")),
            Err(ConfigurationError::MissingAdapter("C".into()))
        );
        assert_eq!(
            config.resolve(&RouteIdentity::new("C", "entity", "GET")),
            Err(ConfigurationError::MissingSelector("C".into()))
        );
    }

    #[test]
    fn test_empty_string_is_unset() {
        let config = config(json!({ "selector": "", "adapter": "header" }));
        assert_eq!(
            config.resolve(&route("collection", "GET")).unwrap(),
            required("HMACSelectorDefault", "header")
        );
    }

    #[test]
    fn test_provider_key() {
        let config: HmacServerConfig = serde_json::from_value(json!({
            "selectors": { "main": "partners", "blank": "", "null": null }
        }))
        .unwrap();

        assert_eq!(config.provider_key("main"), Ok("partners"));
        assert_eq!(
            config.provider_key("blank"),
            Err(ConfigurationError::UnmappedSelector("blank".into()))
        );
        assert_eq!(
            config.provider_key("null"),
            Err(ConfigurationError::UnmappedSelector("null".into()))
        );
        assert_eq!(
            config.provider_key("missing"),
            Err(ConfigurationError::UnknownSelector("missing".into()))
        );
    }
}
