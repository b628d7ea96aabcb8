use lopdf::{Document, Object, Stream, StringFormat, dictionary};

use super::FACTURX_FILENAME;
use super::profile::ZugferdProfile;
use crate::core::RechnungError;

/// Attach the Factur-X XML and the XMP packet to a PDF document.
///
/// Adds the `EmbeddedFile` stream, its `Filespec` with the profile's
/// `AFRelationship`, the `EmbeddedFiles` name tree, and sets `/AF`,
/// `/Names` and `/Metadata` on the catalog. The page content carries no
/// structure tree, so the catalog must not claim `/MarkInfo /Marked`.
pub fn attach_factur_x(
    doc: &mut Document,
    xml: &str,
    profile: ZugferdProfile,
    xmp: String,
    mod_date: &str,
) -> Result<(), RechnungError> {
    let xml_bytes = xml.as_bytes();

    let ef_stream = Stream::new(
        dictionary! {
            "Type" => "EmbeddedFile",
            "Subtype" => Object::Name(b"text/xml".to_vec()),
            "Params" => dictionary! {
                "Size" => xml_bytes.len() as i64,
                "ModDate" => Object::String(mod_date.as_bytes().to_vec(), StringFormat::Literal),
            },
        },
        xml_bytes.to_vec(),
    );
    let ef_stream_id = doc.add_object(ef_stream);

    let filespec_id = doc.add_object(dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal(FACTURX_FILENAME),
        "UF" => Object::string_literal(FACTURX_FILENAME),
        "Desc" => Object::string_literal("Factur-X XML invoice"),
        "AFRelationship" => Object::Name(profile.af_relationship().as_bytes().to_vec()),
        "EF" => dictionary! {
            "F" => ef_stream_id,
            "UF" => ef_stream_id,
        },
    });

    let name_tree_id = doc.add_object(dictionary! {
        "Names" => vec![
            Object::string_literal(FACTURX_FILENAME),
            Object::Reference(filespec_id),
        ],
    });
    let names_id = doc.add_object(dictionary! { "EmbeddedFiles" => name_tree_id });

    // XMP must stay uncompressed
    let metadata_id = doc.add_object(
        Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            xmp.into_bytes(),
        )
        .with_compression(false),
    );

    let catalog = doc
        .catalog_mut()
        .map_err(|e| RechnungError::Packaging(format!("PDF has no catalog: {e}")))?;
    catalog.set("AF", vec![Object::Reference(filespec_id)]);
    catalog.set("Names", names_id);
    catalog.set("Metadata", metadata_id);
    Ok(())
}
