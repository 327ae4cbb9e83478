//! Internal helpers shared across modules.

use std::fmt;

use log::{Level, Log, Record};

/// Emits a record on an explicitly passed logger.
macro_rules! emit {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $crate::utils::emit_record($logger, $level, module_path!(), format_args!($($arg)+))
    };
}

pub(crate) fn emit_record(
    logger: &dyn Log,
    level: Level,
    module_path: &'static str,
    args: fmt::Arguments<'_>,
) {
    let record = Record::builder()
        .args(args)
        .level(level)
        .target(module_path)
        .module_path_static(Some(module_path))
        .build();
    if logger.enabled(record.metadata()) {
        logger.log(&record);
    }
}

/// Extracts the package of a qualified class name.
/// For example: "com.example.Main$Inner" -> "com.example"
/// Classes in the default package yield "".
pub(crate) fn package_name(class_name: &str) -> &str {
    match class_name.rfind('.') {
        Some(pos) => &class_name[..pos],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("com.foo.Bar"), "com.foo");
        assert_eq!(package_name("a.b.c.D$1"), "a.b.c");
        assert_eq!(package_name("Main"), "");
    }
}
