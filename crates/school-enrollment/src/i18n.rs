/// Active locale for user-facing messages.
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// Switch the locale used by [`t`] and [`t_with_args`] ("pt-PT" or "en").
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// Translate `key`, substituting `%{name}` placeholders with the given values.
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut message = t(key);
    for (name, value) in args {
        let placeholder = format!("%{{{name}}}");
        message = message.replace(&placeholder, value);
    }
    message
}

#[cfg(test)]
pub(crate) static LOCALE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
