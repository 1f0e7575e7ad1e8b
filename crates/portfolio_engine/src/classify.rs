use models::{Category, ClassifiedTransaction, LedgerRecord};

/// Narratives carrying any of these never classify as a plain trade; they
/// describe corporate events that only look like buys and sells.
pub const CORPORATE_ACTION_MARKERS: [&str; 6] = [
    "stock split",
    "fusión",
    "escisión",
    "cambio de producto",
    "cambio de isin",
    "conversión fondos del mercado monetario",
];

/// Maps a lower-cased narrative to a canonical label when every token in
/// `all` occurs and none in `none` does. First matching rule wins.
struct LabelRule {
    label: &'static str,
    all: &'static [&'static str],
    none: &'static [&'static str],
}

impl LabelRule {
    fn matches(&self, text: &str) -> bool {
        self.all.iter().all(|t| text.contains(t)) && !self.none.iter().any(|t| text.contains(t))
    }
}

const NORMALIZATION_RULES: &[LabelRule] = &[
    LabelRule {
        label: "transferencia a cuenta de efectivo",
        all: &["transferir a su cuenta de efectivo"],
        none: &[],
    },
    LabelRule {
        label: "transferencia desde cuenta de efectivo",
        all: &["transferir desde su cuenta de efectivo"],
        none: &[],
    },
    LabelRule { label: "compra", all: &["compra "], none: &CORPORATE_ACTION_MARKERS },
    LabelRule { label: "venta", all: &["venta "], none: &CORPORATE_ACTION_MARKERS },
    LabelRule { label: "compra - stock split", all: &["compra ", "stock split"], none: &[] },
    LabelRule { label: "venta - stock split", all: &["venta ", "stock split"], none: &[] },
    LabelRule {
        label: "compra - conversión fondos del mercado monetario",
        all: &["compra ", "conversión fondos del mercado monetario"],
        none: &[],
    },
    LabelRule {
        label: "venta - conversión fondos del mercado monetario",
        all: &["venta ", "conversión fondos del mercado monetario"],
        none: &[],
    },
    LabelRule { label: "compra - fusión", all: &["compra ", "fusión"], none: &[] },
    LabelRule { label: "venta - fusión", all: &["venta ", "fusión"], none: &[] },
    LabelRule { label: "compra - escisión", all: &["compra ", "escisión"], none: &[] },
    LabelRule { label: "venta - escisión", all: &["venta ", "escisión"], none: &[] },
    LabelRule { label: "compra - cambio de isin", all: &["compra ", "cambio de isin"], none: &[] },
    LabelRule { label: "venta - cambio de isin", all: &["venta ", "cambio de isin"], none: &[] },
    LabelRule {
        label: "compra - cambio de producto",
        all: &["compra ", "cambio de producto"],
        none: &[],
    },
    LabelRule {
        label: "venta - cambio de producto",
        all: &["venta ", "cambio de producto"],
        none: &[],
    },
    LabelRule {
        label: "comisión de conectividad",
        all: &["comisión de conectividad"],
        none: &[],
    },
    LabelRule { label: "ingreso externo", all: &["flatex deposit"], none: &[] },
];

/// Canonical lower-case label for a raw narrative. Narratives no rule knows
/// pass through lower-cased.
pub fn normalize_description(raw: &str) -> String {
    let x = raw.to_lowercase();
    for rule in NORMALIZATION_RULES {
        if rule.matches(&x) {
            return rule.label.to_string();
        }
    }
    if x.trim() == "ingreso" {
        return "ingreso externo".to_string();
    }
    x.trim().to_string()
}

/// Assigns a category when the normalized label contains any listed token.
pub struct CategoryRule {
    pub category: Category,
    pub any: &'static [&'static str],
}

/// Priority-ordered: corporate-action and internal-movement markers must
/// win over the plain buy/sell keywords they share text with.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: Category::CambioCorporativo,
        any: &CORPORATE_ACTION_MARKERS,
    },
    CategoryRule { category: Category::CambioDivisa, any: &["cambio de divisa"] },
    CategoryRule {
        category: Category::TransferenciaInterna,
        any: &[
            "cash sweep transfer",
            "transferencia a cuenta de efectivo",
            "transferencia desde cuenta de efectivo",
        ],
    },
    CategoryRule { category: Category::Compra, any: &["compra", "buy"] },
    CategoryRule { category: Category::Venta, any: &["venta", "sell"] },
    CategoryRule {
        category: Category::Dividendo,
        any: &["dividendo", "dividend", "div.", "distribution"],
    },
    CategoryRule {
        category: Category::Ingreso,
        any: &["ingreso", "depósito", "deposit", "transferencia", "transfer"],
    },
    CategoryRule { category: Category::Retiro, any: &["retiro", "withdrawal"] },
    CategoryRule {
        category: Category::Comision,
        any: &["comisión", "commission", "fee", "cargo", "coste", "cost"],
    },
    CategoryRule { category: Category::Impuesto, any: &["stamp duty", "impuesto"] },
];

/// First matching rule wins; anything unmatched is `otro`. Never fails.
pub fn categorize(description: &str) -> Category {
    for rule in CATEGORY_RULES {
        if rule.any.iter().any(|t| description.contains(t)) {
            return rule.category;
        }
    }
    Category::Otro
}

/// Internal bookkeeping labels removed entirely after classification.
/// These are near-zero noise lines, not a category of their own.
pub const DENYLIST: [&str; 9] = [
    "flatex interest income",
    "flatex interest",
    "comisión de conectividad",
    "adr/gdr pass-through fee",
    "rendimiento de capital",
    "fondos del mercado monetario cambio de precio (eur)",
    "venta - conversión fondos del mercado monetario",
    "transferencia a cuenta de efectivo",
    "transferencia desde cuenta de efectivo",
];

pub fn is_denylisted(description: &str) -> bool {
    DENYLIST.contains(&description)
}

fn country_of(isin: Option<&str>) -> String {
    isin.and_then(|i| i.get(0..2))
        .map(str::to_string)
        .unwrap_or_else(|| "None".to_string())
}

/// Classify every loaded record, then drop the denylisted noise lines.
pub fn classify(records: Vec<LedgerRecord>) -> Vec<ClassifiedTransaction> {
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        let description = normalize_description(&record.original_description);
        if is_denylisted(&description) {
            continue;
        }

        let category = categorize(&description);
        let country = country_of(record.isin.as_deref());

        out.push(ClassifiedTransaction {
            record,
            description,
            category,
            country,
            shares: None,
            price: None,
            is_valid: false,
            status: None,
        });
    }

    out
}
