//! The 9R circular-economy framework (R0 Refuse … R9 Recover).
//!
//! Keywords are matched as lowercase substrings, so stems such as `recycl`
//! deliberately cover "recycle", "recycling" and "recycled".

/// One strategy of the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub code: &'static str,
    pub name: &'static str,
    pub definition: &'static str,
    pub keywords: &'static [&'static str],
}

pub const UNCATEGORIZED: &str = "Uncategorized";

pub static STRATEGIES: [Strategy; 10] = [
    Strategy {
        code: "R0",
        name: "Refuse",
        definition: "Avoiding the creation or acquisition of non-essential products.",
        keywords: &[
            "refuse",
            "zero waste",
            "zero-waste",
            "plastic-free",
            "plastic free",
            "package-free",
            "packaging-free",
            "unpackaged",
        ],
    },
    Strategy {
        code: "R1",
        name: "Rethink",
        definition: "Optimizing product use through sharing, multifunctionality, or servitization.",
        keywords: &[
            "rethink",
            "sharing economy",
            "sharing platform",
            "car sharing",
            "carsharing",
            "product-as-a-service",
            "product as a service",
            "servitization",
            "rental",
            "leasing",
            "multifunctional",
        ],
    },
    Strategy {
        code: "R2",
        name: "Reduce",
        definition: "Minimizing material/energy inputs during production.",
        keywords: &[
            "reduce",
            "reduction",
            "resource efficiency",
            "resource-efficient",
            "energy efficiency",
            "energy-efficient",
            "material efficiency",
            "lightweight",
        ],
    },
    Strategy {
        code: "R3",
        name: "Reuse",
        definition: "Repeatedly using a product without reprocessing.",
        keywords: &[
            "reuse",
            "re-use",
            "reusable",
            "second-hand",
            "secondhand",
            "pre-owned",
            "preowned",
            "refill",
            "returnable",
        ],
    },
    Strategy {
        code: "R4",
        name: "Repair",
        definition: "Restoring functionality to defective products.",
        keywords: &["repair", "spare part", "fixing", "maintenance service"],
    },
    Strategy {
        code: "R5",
        name: "Refurbish",
        definition: "Updating products to meet current performance standards.",
        keywords: &["refurbish", "recondition", "renovat", "retrofit", "upgrad"],
    },
    Strategy {
        code: "R6",
        name: "Remanufacture",
        definition: "Industrial process to restore products to original specifications.",
        keywords: &["remanufactur", "rebuil", "overhaul", "core return"],
    },
    Strategy {
        code: "R7",
        name: "Repurpose",
        definition: "Adapting products/components for new applications.",
        keywords: &["repurpos", "upcycl", "second life", "new purpose"],
    },
    Strategy {
        code: "R8",
        name: "Recycle",
        definition: "Reprocessing materials into secondary raw materials.",
        keywords: &[
            "recycl",
            "secondary raw material",
            "scrap metal",
            "waste sorting",
            "compost",
        ],
    },
    Strategy {
        code: "R9",
        name: "Recover",
        definition: "Extracting energy from non-recyclable waste.",
        keywords: &[
            "recover",
            "waste-to-energy",
            "waste to energy",
            "incinerat",
            "biogas",
            "anaerobic digestion",
        ],
    },
];

/// Look up a strategy by its code (`"R0"`..`"R9"`).
pub fn by_code(code: &str) -> Option<&'static Strategy> {
    STRATEGIES.iter().find(|s| s.code == code.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_ordered() {
        let codes: Vec<&str> = STRATEGIES.iter().map(|s| s.code).collect();
        assert_eq!(
            codes,
            ["R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9"]
        );
    }

    #[test]
    fn keywords_are_lowercase() {
        for s in STRATEGIES.iter() {
            for kw in s.keywords {
                assert_eq!(*kw, kw.to_lowercase(), "{} keyword {kw}", s.code);
            }
        }
    }

    #[test]
    fn lookup_by_code() {
        assert_eq!(by_code("R5").map(|s| s.name), Some("Refurbish"));
        assert_eq!(by_code(" R8 ").map(|s| s.name), Some("Recycle"));
        assert!(by_code("R10").is_none());
    }
}
