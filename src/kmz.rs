//! KMZ output: a KML 2.2 document with styled parcel geometry, wrapped as
//! the sole member of a deflated ZIP archive.

use crate::arcgis::ParcelFeature;
use crate::error::Result;
use geo::InteriorPoint;
use geo_types::{Geometry as GeoGeometry, LineString, MultiPolygon, Polygon};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Fixed polygon styling: semi-transparent fill, solid outline, width 3.
/// KML colors are aabbggrr.
const FILL_COLOR: &str = "66973fa2";
const LINE_COLOR: &str = "ff973fa2";
const LINE_WIDTH: u32 = 3;

/// Property keys allowed into placemark descriptions, in output order.
const DESCRIPTION_KEYS: [&str; 6] = ["lot", "plan", "lotplan", "shire_name", "locality", "tenure"];

/// Archive member name. Geographic viewers expect exactly this.
const DOC_NAME: &str = "doc.kml";

const ROOT_FOLDER: &str = "parcels";

/// A named bundle of parcel features destined for one folder in the archive.
#[derive(Debug, Clone)]
pub struct ResolutionGroup {
    pub label: String,
    pub features: Vec<ParcelFeature>,
}

/// Serialize labeled groups into KMZ bytes.
///
/// Each group becomes a named folder under one root folder; a single group
/// with an empty label flattens directly into the root.
pub fn serialize(groups: &[ResolutionGroup]) -> Result<Vec<u8>> {
    let kml = build_kml(groups);
    let mut buf = Vec::new();
    {
        let mut archive = ZipWriter::new(Cursor::new(&mut buf));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        archive.start_file(DOC_NAME, options)?;
        archive.write_all(kml.as_bytes())?;
        archive.finish()?;
    }
    Ok(buf)
}

fn build_kml(groups: &[ResolutionGroup]) -> String {
    let mut doc = String::new();
    doc.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    doc.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n<Document>\n");
    doc.push_str(&format!("<Folder>\n<name>{}</name>\n", xml_escape(ROOT_FOLDER)));

    let flatten = groups.len() == 1 && groups[0].label.is_empty();
    for group in groups {
        if !flatten {
            doc.push_str(&format!("<Folder>\n<name>{}</name>\n", xml_escape(&group.label)));
        }
        for feature in &group.features {
            write_placemark(&mut doc, feature);
        }
        if !flatten {
            doc.push_str("</Folder>\n");
        }
    }

    doc.push_str("</Folder>\n</Document>\n</kml>\n");
    doc
}

fn write_placemark(doc: &mut String, feature: &ParcelFeature) {
    let Some(geometry) = &feature.geometry else {
        return;
    };
    let Ok(geom) = GeoGeometry::<f64>::try_from(geometry.value.clone()) else {
        return;
    };

    let name = xml_escape(&feature.display_name());
    let description = xml_escape(&description_text(feature));

    doc.push_str("<Placemark>\n");
    doc.push_str(&format!("<name>{}</name>\n", name));
    if !description.is_empty() {
        doc.push_str(&format!("<description>{}</description>\n", description));
    }
    doc.push_str(&style_block());

    match geom {
        GeoGeometry::Polygon(p) => write_polygon(doc, &p),
        GeoGeometry::MultiPolygon(mp) => write_multipolygon(doc, &mp),
        other => write_point_fallback(doc, &other),
    }
    doc.push_str("</Placemark>\n");
}

fn style_block() -> String {
    format!(
        "<Style>\n<PolyStyle><color>{}</color><fill>1</fill></PolyStyle>\n\
         <LineStyle><color>{}</color><width>{}</width></LineStyle>\n</Style>\n",
        FILL_COLOR, LINE_COLOR, LINE_WIDTH
    )
}

fn write_polygon(doc: &mut String, polygon: &Polygon<f64>) {
    doc.push_str("<Polygon>\n<outerBoundaryIs><LinearRing><coordinates>");
    doc.push_str(&ring_coordinates(polygon.exterior()));
    doc.push_str("</coordinates></LinearRing></outerBoundaryIs>\n");
    for interior in polygon.interiors() {
        doc.push_str("<innerBoundaryIs><LinearRing><coordinates>");
        doc.push_str(&ring_coordinates(interior));
        doc.push_str("</coordinates></LinearRing></innerBoundaryIs>\n");
    }
    doc.push_str("</Polygon>\n");
}

fn write_multipolygon(doc: &mut String, mp: &MultiPolygon<f64>) {
    doc.push_str("<MultiGeometry>\n");
    for polygon in &mp.0 {
        write_polygon(doc, polygon);
    }
    doc.push_str("</MultiGeometry>\n");
}

fn write_point_fallback(doc: &mut String, geom: &GeoGeometry<f64>) {
    if let Some(point) = geom.interior_point() {
        doc.push_str(&format!(
            "<Point><coordinates>{},{}</coordinates></Point>\n",
            point.x(),
            point.y()
        ));
    }
}

fn ring_coordinates(ring: &LineString<f64>) -> String {
    ring.coords()
        .map(|c| format!("{},{}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn description_text(feature: &ParcelFeature) -> String {
    let p = &feature.properties;
    DESCRIPTION_KEYS
        .iter()
        .filter_map(|key| {
            let value = match *key {
                "lot" => p.lot.as_deref(),
                "plan" => p.plan.as_deref(),
                "lotplan" => p.lotplan.as_deref(),
                "shire_name" => p.shire_name.as_deref(),
                "locality" => p.locality.as_deref(),
                "tenure" => p.tenure.as_deref(),
                _ => None,
            };
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}: {}", key, v))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
