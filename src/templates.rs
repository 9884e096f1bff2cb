use std::sync::OnceLock;
use tera::Tera;

pub const RECEIPT_TEMPLATE: &str = "receipt.txt";

static TERA: OnceLock<Tera> = OnceLock::new();

/// Templates are compiled into the binary so rendering does not depend on the
/// working directory.
pub fn get_tera() -> &'static Tera {
    TERA.get_or_init(|| {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(
            RECEIPT_TEMPLATE,
            include_str!("../templates/receipt.txt"),
        )
        .expect("Failed to load embedded templates");
        tera
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_templates_compile() {
        assert!(get_tera()
            .get_template_names()
            .any(|name| name == RECEIPT_TEMPLATE));
    }
}
