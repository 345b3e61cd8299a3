use fluent_bundle::{FluentArgs, FluentBundle, FluentResource, FluentValue};
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

const DEFAULT_LOCALE: &str = "en-US";

const LOCALES: &[(&str, &str)] = &[
    ("en-US", include_str!("../assets/i18n/en-US.ftl")),
    ("es-ES", include_str!("../assets/i18n/es-ES.ftl")),
];

pub struct I18n {
    bundles: HashMap<LanguageIdentifier, FluentBundle<FluentResource>>,
    pub available_locales: Vec<LanguageIdentifier>,
    current_locale: LanguageIdentifier,
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(None)
    }
}

impl I18n {
    pub fn new(locale: Option<&str>) -> Self {
        let mut bundles = HashMap::new();
        let mut available_locales = Vec::new();

        for (locale_str, source) in LOCALES {
            let Ok(locale) = locale_str.parse::<LanguageIdentifier>() else {
                continue;
            };
            let resource = match FluentResource::try_new(source.to_string()) {
                Ok(res) => res,
                Err((res, errors)) => {
                    tracing::warn!(locale = %locale, ?errors, "Translation file has syntax errors");
                    res
                }
            };
            let mut bundle = FluentBundle::new(vec![locale.clone()]);
            // Placeholders are substituted verbatim, without bidi isolation marks.
            bundle.set_use_isolating(false);
            if let Err(errors) = bundle.add_resource(resource) {
                tracing::warn!(locale = %locale, ?errors, "Duplicate translation keys");
            }
            bundles.insert(locale.clone(), bundle);
            available_locales.push(locale);
        }

        let default_locale: LanguageIdentifier = DEFAULT_LOCALE.parse().unwrap_or_default();
        let current_locale = locale
            .and_then(|l| l.parse::<LanguageIdentifier>().ok())
            .filter(|l| bundles.contains_key(l))
            .unwrap_or(default_locale);

        Self {
            bundles,
            available_locales,
            current_locale,
        }
    }

    pub fn current_locale(&self) -> &LanguageIdentifier {
        &self.current_locale
    }

    pub fn set_locale(&mut self, locale: LanguageIdentifier) {
        if self.bundles.contains_key(&locale) {
            self.current_locale = locale;
        }
    }

    /// Current locale, then en-US unless that is already current.
    fn lookup_chain(&self) -> Vec<LanguageIdentifier> {
        let mut chain = vec![self.current_locale.clone()];
        if let Ok(fallback) = DEFAULT_LOCALE.parse::<LanguageIdentifier>() {
            if fallback != self.current_locale {
                chain.push(fallback);
            }
        }
        chain
    }

    pub fn tr(&self, key: &str) -> String {
        self.tr_args(key, &[])
    }

    /// Looks up `key` in the current locale (falling back to en-US) and
    /// substitutes the named `args`.
    pub fn tr_args(&self, key: &str, args: &[(&str, String)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(value.clone()));
        }

        for locale in self.lookup_chain() {
            let Some(bundle) = self.bundles.get(&locale) else {
                continue;
            };
            let Some(pattern) = bundle.get_message(key).and_then(|msg| msg.value()) else {
                continue;
            };
            let mut errors = vec![];
            let value = bundle.format_pattern(pattern, Some(&fluent_args), &mut errors);
            if errors.is_empty() {
                return value.to_string();
            }
            tracing::debug!(key, ?errors, "Translation formatting failed");
        }
        format!("MISSING: {}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_named_parameters() {
        let i18n = I18n::new(Some("en-US"));
        let msg = i18n.tr_args(
            "progress-generating-image",
            &[("current", "2".to_string()), ("total", "5".to_string())],
        );
        assert_eq!(msg, "Generating image for slide 2 of 5...");
    }

    #[test]
    fn test_unknown_locale_falls_back_to_default() {
        let i18n = I18n::new(Some("xx-YY"));
        assert_eq!(i18n.current_locale().to_string(), "en-US");
        assert_eq!(i18n.available_locales.len(), 2);
    }

    #[test]
    fn test_spanish_lookup() {
        let i18n = I18n::new(Some("es-ES"));
        assert!(i18n.tr("error-invalid-key").contains("clave de API"));
    }

    #[test]
    fn test_default_locale_is_looked_up_once() {
        let english = I18n::new(Some("en-US"));
        assert_eq!(english.lookup_chain().len(), 1);
        let spanish = I18n::new(Some("es-ES"));
        let chain: Vec<String> = spanish.lookup_chain().iter().map(|l| l.to_string()).collect();
        assert_eq!(chain, vec!["es-ES", "en-US"]);
    }

    #[test]
    fn test_missing_key() {
        let i18n = I18n::default();
        assert_eq!(i18n.tr("no-such-key"), "MISSING: no-such-key");
    }

    #[test]
    fn test_set_locale_ignores_unavailable() {
        let mut i18n = I18n::default();
        i18n.set_locale("de-DE".parse().unwrap());
        assert_eq!(i18n.current_locale().to_string(), "en-US");
    }
}
