//! Scraper for the apstat status page.
//!
//! The page lists one access point per table row: a district cell holding a
//! link plus address lines, a room cell, and an access point cell holding a
//! link. Districts are keyed by their link target.

use std::collections::BTreeMap;

use scraper::{node::Node, ElementRef, Html, Selector};

use super::{AccessPointRef, LibraryTopology, Room, Topology};
use crate::pipeline::PipelineError;

const LIBRARY_MARKER: &str = "bibliothek";

fn selector(css: &'static str) -> Result<Selector, PipelineError> {
    Selector::parse(css).map_err(|e| PipelineError::Parse(format!("invalid selector {css:?}: {e}")))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_owned()
}

/// Text of each direct child of the district cell, minus the district name.
fn address_lines(cell: ElementRef<'_>, district_name: &str) -> Vec<String> {
    cell.children()
        .filter_map(|child| match child.value() {
            Node::Text(t) => Some(t.trim().to_owned()),
            Node::Element(_) => ElementRef::wrap(child).map(text_of),
            _ => None,
        })
        .filter(|line| !line.is_empty() && line != district_name)
        .collect()
}

/// Parse every district in the first table body of the page.
pub fn parse_districts(html: &str) -> Result<Topology, PipelineError> {
    let doc = Html::parse_document(html);
    let tbody_sel = selector("tbody")?;
    let tr_sel = selector("tr")?;
    let td_sel = selector("td")?;
    let a_sel = selector("a")?;

    let tbody = doc
        .select(&tbody_sel)
        .next()
        .ok_or_else(|| PipelineError::Parse("apstat page has no table body".to_string()))?;

    let mut districts: BTreeMap<String, LibraryTopology> = BTreeMap::new();

    for row in tbody.select(&tr_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
        if cells.len() < 3 {
            continue;
        }
        let Some(link) = cells[0].select(&a_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let name = text_of(link);

        let district = districts.entry(href.to_owned()).or_insert_with(|| {
            let mut d = LibraryTopology::new(name.clone());
            d.url = Some(href.to_owned());
            d.address = address_lines(cells[0], &name);
            d
        });
        if district.name != name {
            tracing::warn!(url = href, expected = %district.name, found = %name, "district name changed between rows");
            continue;
        }

        let Some(ap_link) = cells[2].select(&a_sel).next() else {
            tracing::warn!(url = href, "row without access point link");
            continue;
        };
        let room_name = text_of(cells[1]);
        let room = district.rooms.entry(room_name.clone()).or_insert_with(|| Room {
            name: room_name,
            aps: Vec::new(),
        });
        room.aps.push(AccessPointRef {
            name: text_of(ap_link),
            url: ap_link.value().attr("href").unwrap_or_default().to_owned(),
        });
    }

    Ok(districts.into_iter().collect())
}

fn is_library(name: &str) -> bool {
    name.to_lowercase().contains(LIBRARY_MARKER)
}

/// Keep library districts whole; from other districts keep only their library rooms.
pub fn select_libraries(districts: &Topology) -> Topology {
    let mut libraries = Topology::default();

    for (key, district) in districts.libraries() {
        if is_library(&district.name) {
            libraries.insert(key, district.clone());
            continue;
        }

        let rooms: BTreeMap<String, Room> = district
            .rooms
            .iter()
            .filter(|(_, room)| is_library(&room.name))
            .map(|(k, room)| (k.clone(), room.clone()))
            .collect();
        if !rooms.is_empty() {
            libraries.insert(key, LibraryTopology { rooms, ..district.clone() });
        }
    }

    libraries
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body><table>
          <thead><tr><th>Bezirk</th><th>Raum</th><th>AP</th></tr></thead>
          <tbody>
            <tr>
              <td><a href="/apstat/b/1">Universitätsbibliothek</a><br/>Arcisstr. 21<br/>80333 München</td>
              <td>Lesesaal</td>
              <td><a href="/apstat/ap/apa01-0mg">apa01-0mg</a></td>
            </tr>
            <tr>
              <td><a href="/apstat/b/1">Universitätsbibliothek</a><br/>Arcisstr. 21</td>
              <td>Lesesaal</td>
              <td><a href="/apstat/ap/apa02-0mg">apa02-0mg</a></td>
            </tr>
            <tr>
              <td><a href="/apstat/b/2">Physik</a><br/>James-Franck-Str. 1</td>
              <td>Teilbibliothek Physik</td>
              <td><a href="/apstat/ap/apb01-1og">apb01-1og</a></td>
            </tr>
            <tr>
              <td><a href="/apstat/b/2">Physik</a></td>
              <td>Hörsaal 1</td>
              <td><a href="/apstat/ap/apb02-1og">apb02-1og</a></td>
            </tr>
            <tr>
              <td><a href="/apstat/b/3">Mensa</a></td>
              <td>Speisesaal</td>
              <td><a href="/apstat/ap/apc01-0mg">apc01-0mg</a></td>
            </tr>
            <tr><td>Summe</td><td></td><td></td></tr>
          </tbody>
        </table></body></html>
    "#;

    #[test]
    fn parses_districts_rooms_and_access_points() {
        let districts = parse_districts(PAGE).unwrap();
        assert_eq!(districts.len(), 3);

        let ub = districts.get("/apstat/b/1").unwrap();
        assert_eq!(ub.name, "Universitätsbibliothek");
        assert_eq!(ub.url.as_deref(), Some("/apstat/b/1"));
        assert_eq!(ub.address, vec!["Arcisstr. 21", "80333 München"]);
        assert_eq!(ub.access_point_names(), vec!["apa01-0mg", "apa02-0mg"]);
        assert_eq!(ub.rooms["Lesesaal"].aps[0].url, "/apstat/ap/apa01-0mg");
    }

    #[test]
    fn selects_library_districts_and_library_rooms() {
        let libraries = select_libraries(&parse_districts(PAGE).unwrap());
        assert_eq!(libraries.len(), 2);

        assert_eq!(libraries.get("/apstat/b/1").unwrap().rooms.len(), 1);

        let physik = libraries.get("/apstat/b/2").unwrap();
        assert_eq!(physik.name, "Physik");
        assert_eq!(physik.address, vec!["James-Franck-Str. 1"]);
        assert_eq!(physik.access_point_names(), vec!["apb01-1og"]);

        assert!(libraries.get("/apstat/b/3").is_none());
    }

    #[test]
    fn page_without_table_body_is_rejected() {
        assert!(matches!(parse_districts("<p>maintenance</p>"), Err(PipelineError::Parse(_))));
    }
}
