// Receipt PDF generation
// Uses genpdf - requires Liberation or similar fonts in standard paths
use crate::error::{AppError, Result};
use crate::receipt::{Receipt, CONFERENCE_NAME};
use genpdf::elements::{Break, Paragraph, TableLayout};
use genpdf::style::Style;
use genpdf::Element;

const FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/TTF",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];

fn load_font_family() -> Result<genpdf::fonts::FontFamily<genpdf::fonts::FontData>> {
    // genpdf needs actual font files for metrics
    FONT_DIRS
        .iter()
        .filter(|p| std::path::Path::new(p).exists())
        .find_map(|path| {
            ["LiberationSans", "DejaVuSans", "Arial"]
                .iter()
                .find_map(|name| genpdf::fonts::from_files(*path, name, None).ok())
        })
        .ok_or_else(|| AppError::Internal {
            message: "No suitable fonts found. Install: apt install fonts-liberation".to_string(),
        })
}

fn row(table: &mut TableLayout, label: &str, value: &str) -> Result<()> {
    table
        .row()
        .element(Paragraph::new(label).styled(Style::new().bold()))
        .element(Paragraph::new(value))
        .push()
        .map_err(|e| AppError::Internal {
            message: format!("receipt layout error: {}", e),
        })
}

/// Renders the downloadable receipt. Every field comes from `receipt`, so the
/// same transaction always yields the same content.
pub fn render_receipt(receipt: &Receipt) -> Result<Vec<u8>> {
    let mut doc = genpdf::Document::new(load_font_family()?);
    doc.set_title(format!("Receipt {}", receipt.receipt_number));

    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(15);
    doc.set_page_decorator(decorator);

    doc.push(Paragraph::new(CONFERENCE_NAME).styled(Style::new().with_font_size(18)));
    doc.push(Paragraph::new("Payment Receipt").styled(Style::new().with_font_size(14).bold()));
    doc.push(Break::new(1.0));

    let mut table = TableLayout::new(vec![1, 2]);
    row(&mut table, "Receipt No.", &receipt.receipt_number)?;
    row(&mut table, "Transaction ID", &receipt.txnid)?;
    if let Some(reference) = &receipt.gateway_reference {
        row(&mut table, "Gateway Ref.", reference)?;
    }
    row(&mut table, "Date of Payment", &receipt.paid_on())?;
    row(&mut table, "Received from", &receipt.payer_name)?;
    row(&mut table, "Email", &receipt.payer_email)?;
    row(&mut table, "Phone", &receipt.payer_phone)?;
    if !receipt.payer_affiliation.is_empty() {
        row(&mut table, "Affiliation", &receipt.payer_affiliation)?;
    }
    row(&mut table, "Description", &receipt.product_info)?;
    row(&mut table, "Category", &receipt.role.as_str().to_uppercase())?;
    row(&mut table, "Amount Paid", &format!("INR {}", receipt.amount_text()))?;
    doc.push(table);

    doc.push(Break::new(1.5));
    doc.push(
        Paragraph::new("This is a computer generated receipt and does not require a signature.")
            .styled(Style::new().with_font_size(9)),
    );

    let mut bytes = Vec::new();
    doc.render(&mut bytes).map_err(|e| AppError::Internal {
        message: format!("receipt render error: {}", e),
    })?;
    Ok(bytes)
}
