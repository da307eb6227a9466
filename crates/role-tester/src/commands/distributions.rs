//! Distributions command implementation
//!
//! Lists the built-in distribution catalog.

use role_tester_core::distribution::{catalog, DistributionRecord};

/// Render the catalog as an aligned table
pub fn render_catalog(records: &[DistributionRecord]) -> String {
    let mut out = format!(
        "{:<20} {:<14} {:<14} {}\n",
        "NAME", "USER", "DISTRIBUTION", "IMAGE"
    );
    for record in records {
        out.push_str(&format!(
            "{:<20} {:<14} {:<14} {}\n",
            record.name, record.user, record.distro, record.image_reference
        ));
    }
    out
}

/// Execute the distributions command
pub fn execute_distributions() {
    print!("{}", render_catalog(catalog()));
}
