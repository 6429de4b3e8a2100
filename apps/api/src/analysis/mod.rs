// Document analysis: upload, dispatch to the hosted model, and the record of
// completed analyses. Dispatch is gated on an active subscription.

pub mod dispatch;
pub mod files;
pub mod handlers;
pub mod records;
pub mod upload;

use uuid::Uuid;

/// Name a stored PDF is presented under, e.g. `document-1a2b3c4d.pdf`.
pub fn pdf_display_name(id: Uuid) -> String {
    format!("document-{}.pdf", &id.simple().to_string()[..8])
}

/// Name a stored ZIP is presented under, e.g. `resources-1a2b3c4d.zip`.
pub fn zip_display_name(id: Uuid) -> String {
    format!("resources-{}.zip", &id.simple().to_string()[..8])
}
