//! Import resolution against the virtual filesystem.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::assets::{is_asset, placeholder_module};
use crate::backend::{ModuleHost, Resolution};
use crate::path::{dirname, is_relative, join_paths, resolve_in_map, strip_prefix, SOURCE_ALIAS};
use crate::SourceMap;

/// Whether a specifier is bare: not relative, absolute or alias-rooted and
/// without a URL scheme.
pub fn is_bare_specifier(specifier: &str) -> bool {
    !specifier.is_empty()
        && !specifier.starts_with('.')
        && !specifier.starts_with('/')
        && !specifier.starts_with(SOURCE_ALIAS)
        && !specifier.contains(':')
}

/// Resolver host backed by a normalized source map.
///
/// Records every bare specifier it encounters so the caller can hand them
/// to dependency installation.
pub struct VirtualResolver<'a> {
    files: &'a SourceMap,
    externals: Mutex<BTreeSet<String>>,
    warnings: Mutex<Vec<String>>,
}

impl<'a> VirtualResolver<'a> {
    pub fn new(files: &'a SourceMap) -> Self {
        Self {
            files,
            externals: Mutex::new(BTreeSet::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Bare specifiers seen so far, sorted.
    pub fn externals(&self) -> Vec<String> {
        self.externals.lock().iter().cloned().collect()
    }

    /// Resolution warnings (last-resort externals) seen so far.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl ModuleHost for VirtualResolver<'_> {
    fn resolve(&self, specifier: &str, importer: &str) -> Resolution {
        if let Some(path) = resolve_in_map(strip_prefix(specifier), self.files) {
            return Resolution::Virtual(path);
        }

        let joined = is_relative(specifier).then(|| join_paths(dirname(importer), specifier));
        if let Some(joined) = &joined {
            if let Some(path) = resolve_in_map(joined, self.files) {
                return Resolution::Virtual(path);
            }
        }

        if is_asset(specifier) {
            let path = joined.unwrap_or_else(|| strip_prefix(specifier).to_string());
            debug!("Substituting placeholder for asset {}", specifier);
            return Resolution::Asset {
                id: format!("asset:{path}"),
                source: placeholder_module(specifier),
            };
        }

        if is_bare_specifier(specifier) {
            self.externals.lock().insert(specifier.to_string());
            return Resolution::External(specifier.to_string());
        }

        let message = format!(
            "Could not resolve \"{}\" from \"{}\"; treating it as external",
            specifier, importer
        );
        warn!("{}", message);
        self.warnings.lock().push(message);
        Resolution::External(specifier.to_string())
    }

    fn load(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> SourceMap {
        [
            ("App.tsx", "export default 1"),
            ("components/Button.tsx", "export const Button = 1"),
            ("components/ui/Card.tsx", "export const Card = 1"),
            ("lib/utils.ts", "export const cn = 1"),
            ("hooks/index.ts", "export const useThing = 1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_bare_specifier_detection() {
        assert!(is_bare_specifier("react"));
        assert!(is_bare_specifier("@radix-ui/react-dialog"));
        assert!(is_bare_specifier("react-dom/client"));
        assert!(!is_bare_specifier("./App"));
        assert!(!is_bare_specifier("/App"));
        assert!(!is_bare_specifier("@/lib/utils"));
        assert!(!is_bare_specifier("https://esm.sh/react"));
        assert!(!is_bare_specifier(""));
    }

    #[test]
    fn test_resolution_order() {
        let files = files();
        let resolver = VirtualResolver::new(&files);

        assert_eq!(
            resolver.resolve("@/lib/utils", "components/Button.tsx"),
            Resolution::Virtual("lib/utils.ts".into())
        );
        assert_eq!(
            resolver.resolve("../Button", "components/ui/Card.tsx"),
            Resolution::Virtual("components/Button.tsx".into())
        );
        assert_eq!(
            resolver.resolve("./hooks", "App.tsx"),
            Resolution::Virtual("hooks/index.ts".into())
        );
        assert!(matches!(
            resolver.resolve("./logo.svg", "App.tsx"),
            Resolution::Asset { .. }
        ));
        assert_eq!(
            resolver.resolve("react", "App.tsx"),
            Resolution::External("react".into())
        );
        assert_eq!(resolver.externals(), vec!["react".to_string()]);
    }

    #[test]
    fn test_unresolved_relative_is_last_resort_external() {
        let files = files();
        let resolver = VirtualResolver::new(&files);

        assert_eq!(
            resolver.resolve("./Missing", "App.tsx"),
            Resolution::External("./Missing".into())
        );
        assert!(resolver.externals().is_empty());
        assert_eq!(resolver.warnings().len(), 1);
    }

    #[test]
    fn test_load() {
        let files = files();
        let resolver = VirtualResolver::new(&files);
        assert!(resolver.load("App.tsx").is_some());
        assert!(resolver.load("nope.tsx").is_none());
    }
}
