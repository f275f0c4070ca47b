/// How a product identifier should be looked up.
///
/// EAN-style codes go through the rotating external search channels; model
/// numbers go straight to the Argos site search, which tolerates a much
/// tighter request cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// Barcode-like product code, resolved via external search providers.
    Code,
    /// Manufacturer model number, resolved via Argos direct search.
    Model,
}

impl LookupKind {
    pub fn label(self) -> &'static str {
        match self {
            LookupKind::Code => "ean",
            LookupKind::Model => "model",
        }
    }
}

/// One identifier read from the input file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductId {
    pub value: String,
    pub kind: LookupKind,
}

impl ProductId {
    pub fn new(value: impl Into<String>, kind: LookupKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    /// Filesystem-safe form of the identifier, used for per-product output files.
    pub fn sanitized(&self) -> String {
        self.value.replace('/', "_").replace('\\', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_replaces_path_separators() {
        let id = ProductId::new("CHP61/100WH", LookupKind::Model);
        assert_eq!(id.sanitized(), "CHP61_100WH");

        let id = ProductId::new("A\\B/C", LookupKind::Code);
        assert_eq!(id.sanitized(), "A_B_C");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(LookupKind::Code.label(), "ean");
        assert_eq!(LookupKind::Model.label(), "model");
    }
}
