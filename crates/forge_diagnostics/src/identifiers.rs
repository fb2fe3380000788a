//! Well-known identifiers and the module they conventionally come from.

/// How an identifier is bound by its import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStyle {
    /// `import { name } from "module"`
    Named,
    /// `import name from "module"`
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownIdentifier {
    pub name: &'static str,
    pub module: &'static str,
    pub style: ImportStyle,
}

const fn named(name: &'static str, module: &'static str) -> KnownIdentifier {
    KnownIdentifier {
        name,
        module,
        style: ImportStyle::Named,
    }
}

const fn default(name: &'static str, module: &'static str) -> KnownIdentifier {
    KnownIdentifier {
        name,
        module,
        style: ImportStyle::Default,
    }
}

pub const KNOWN_IDENTIFIERS: &[KnownIdentifier] = &[
    // React
    default("React", "react"),
    named("useState", "react"),
    named("useEffect", "react"),
    named("useRef", "react"),
    named("useMemo", "react"),
    named("useCallback", "react"),
    named("useContext", "react"),
    named("useReducer", "react"),
    named("useLayoutEffect", "react"),
    named("useId", "react"),
    named("useTransition", "react"),
    named("createContext", "react"),
    named("forwardRef", "react"),
    named("memo", "react"),
    named("lazy", "react"),
    named("Fragment", "react"),
    named("Suspense", "react"),
    named("createRoot", "react-dom/client"),
    // Routing
    named("useNavigate", "react-router-dom"),
    named("useParams", "react-router-dom"),
    named("useLocation", "react-router-dom"),
    named("useSearchParams", "react-router-dom"),
    named("Link", "react-router-dom"),
    named("NavLink", "react-router-dom"),
    named("Routes", "react-router-dom"),
    named("Route", "react-router-dom"),
    named("BrowserRouter", "react-router-dom"),
    named("Navigate", "react-router-dom"),
    // Icons
    named("ArrowRight", "lucide-react"),
    named("ArrowLeft", "lucide-react"),
    named("Check", "lucide-react"),
    named("ChevronDown", "lucide-react"),
    named("ChevronRight", "lucide-react"),
    named("ChevronLeft", "lucide-react"),
    named("Menu", "lucide-react"),
    named("X", "lucide-react"),
    named("Search", "lucide-react"),
    named("Plus", "lucide-react"),
    named("Minus", "lucide-react"),
    named("Trash2", "lucide-react"),
    named("Edit", "lucide-react"),
    named("Star", "lucide-react"),
    named("Heart", "lucide-react"),
    named("User", "lucide-react"),
    named("Users", "lucide-react"),
    named("Settings", "lucide-react"),
    named("Loader2", "lucide-react"),
    named("Mail", "lucide-react"),
    named("Phone", "lucide-react"),
    named("Calendar", "lucide-react"),
    named("Sun", "lucide-react"),
    named("Moon", "lucide-react"),
    named("ShoppingCart", "lucide-react"),
    named("Bell", "lucide-react"),
    named("LogOut", "lucide-react"),
    // Utilities
    named("cn", "@/lib/utils"),
    named("clsx", "clsx"),
    named("twMerge", "tailwind-merge"),
    named("motion", "framer-motion"),
    named("AnimatePresence", "framer-motion"),
    named("toast", "sonner"),
    named("Toaster", "sonner"),
    named("z", "zod"),
    default("axios", "axios"),
];

/// Look an identifier up in the table.
pub fn lookup(name: &str) -> Option<&'static KnownIdentifier> {
    KNOWN_IDENTIFIERS.iter().find(|known| known.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("useState").map(|k| k.module), Some("react"));
        assert_eq!(lookup("React").map(|k| k.style), Some(ImportStyle::Default));
        assert_eq!(lookup("cn").map(|k| k.module), Some("@/lib/utils"));
        assert!(lookup("Btn").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = KNOWN_IDENTIFIERS.iter().map(|k| k.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), KNOWN_IDENTIFIERS.len());
    }
}
