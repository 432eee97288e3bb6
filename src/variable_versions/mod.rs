//! Template-driven NetFlow protocols (V9 and IPFIX).
//!
//! Both protocols ship the record layout separately from the records:
//! template flowsets declare `(field type, length)` sequences, data flowsets
//! reference a template id and carry packed records. The collector resolves
//! template declarations against a [field catalog](catalog), compiles them
//! into [binary record layouts](template) and keeps them in an
//! [exporter-scoped cache](cache) until the exporter goes silent.
//!
//! | | NetFlow V9 | IPFIX |
//! |---------------------|----------------|------------------|
//! | Standard | Cisco (RFC 3954) | IETF (RFC 7011) |
//! | Template flowsets | 0 / 1 (options) | 2 / 3 (options) |
//! | Enterprise fields | no | type high bit + PEN |
//! | Data record count | length mod width | read until end |
//! | Scope field naming | fixed enumeration | field catalog |

pub mod cache;
pub mod catalog;
pub mod ipfix;
pub mod template;
pub mod v9;

use crate::decoder::Decoder;
use crate::variable_versions::cache::TemplateKey;
use crate::variable_versions::template::{CompiledField, Template};

use log::{debug, warn};

/// Caches a fully resolved template, or counts the rejection when any of its
/// fields failed to resolve (`fields == None`) or the compiled width is
/// zero. Shared by the V9 and IPFIX template flowset parsers.
pub(crate) fn store_template(
    decoder: &Decoder,
    key: TemplateKey,
    fields: Option<Vec<CompiledField>>,
    protocol: &str,
) {
    let Some(fields) = fields else {
        decoder.metrics.record_template_rejected();
        return;
    };
    match Template::new(fields) {
        Some(template) => {
            debug!(
                "learned {protocol} template {} for source id {} from {}:{} ({} bytes per record)",
                key.template_id,
                key.source_id,
                key.host,
                key.port,
                template.width()
            );
            let swept = decoder.templates.put(key, template);
            decoder.metrics.record_template_learned();
            if swept > 0 {
                debug!("expired {swept} idle template(s) from the cache");
                decoder.metrics.record_cache_expirations(swept as u64);
            }
        }
        None => {
            warn!(
                "{protocol} template {} from {}:{} compiles to zero-width records, rejecting",
                key.template_id, key.host, key.port
            );
            decoder.metrics.record_template_rejected();
        }
    }
}
