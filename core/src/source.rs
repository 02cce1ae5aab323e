//! Tab-separated place dataset.
//!
//! Layout: a header row, then `id, name, address, phone, longitude, latitude`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SourceError;
use crate::{GeoPoint, Place};

const COLUMNS: usize = 6;

pub fn read_places<P: AsRef<Path>>(path: P) -> Result<Vec<Place>, SourceError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|source| SourceError::Io { path: path.display().to_string(), source })?;
    let places = parse_places(BufReader::new(f))?;
    tracing::info!(path = %path.display(), count = places.len(), "loaded places");
    Ok(places)
}

pub fn parse_places<R: BufRead>(reader: R) -> Result<Vec<Place>, SourceError> {
    let mut places = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| SourceError::Parse { line: line_no, reason: e.to_string() })?;
        // header
        if idx == 0 { continue; }
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() { continue; }
        places.push(parse_line(line, line_no)?);
    }
    Ok(places)
}

fn parse_line(line: &str, line_no: usize) -> Result<Place, SourceError> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < COLUMNS {
        return Err(SourceError::Parse { line: line_no, reason: format!("expected {COLUMNS} columns, got {}", cols.len()) });
    }
    let err = |what: &str, v: &str| SourceError::Parse { line: line_no, reason: format!("invalid {what} '{v}'") };
    let id = cols[0].trim().parse().map_err(|_| err("id", cols[0]))?;
    let lon: f64 = cols[4].trim().parse().map_err(|_| err("longitude", cols[4]))?;
    let lat: f64 = cols[5].trim().parse().map_err(|_| err("latitude", cols[5]))?;
    let location = GeoPoint::new(lat, lon);
    if !location.in_range() {
        return Err(SourceError::Parse { line: line_no, reason: format!("coordinates out of range: lat {lat}, lon {lon}") });
    }
    Ok(Place {
        id,
        name: cols[1].to_string(),
        address: cols[2].to_string(),
        phone: cols[3].to_string(),
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "ID\tName\tAddress\tPhone\tLongitude\tLatitude\n\
        1\tSMETANA\tул. Егора Абакумова, д. 9\t(499) 183-14-10\t37.714565000436\t55.879001531303\n\
        2\tRodnik\tул. Талалихина, д. 2/1, корп. 1\t(495) 676-55-35\t37.673306475172\t55.738261371317\n";

    #[test]
    fn parses_rows_and_skips_header() {
        let places = parse_places(SAMPLE.as_bytes()).unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].id, 1);
        assert_eq!(places[0].name, "SMETANA");
        assert!((places[0].location.lat - 55.879001531303).abs() < 1e-9);
        assert!((places[0].location.lon - 37.714565000436).abs() < 1e-9);
        assert_eq!(places[1].phone, "(495) 676-55-35");
    }

    #[test]
    fn reports_line_numbers() {
        let bad = "h\n1\ta\tb\tc\t37.0\t55.0\nx\ta\tb\tc\t37.0\t55.0\n";
        match parse_places(bad.as_bytes()) {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_and_short_rows() {
        assert!(parse_places("h\n1\ta\tb\tc\t37.0\t95.0\n".as_bytes()).is_err());
        assert!(parse_places("h\n1\ta\tb\n".as_bytes()).is_err());
    }

    #[test]
    fn blank_lines_and_crlf() {
        let places = parse_places("h\r\n\r\n5\ta\tb\tc\t1.5\t2.5\r\n".as_bytes()).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].location, GeoPoint::new(2.5, 1.5));
    }

    #[test]
    fn reads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        f.flush().unwrap();
        let places = read_places(f.path()).unwrap();
        assert_eq!(places.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.tsv");
        match read_places(&path) {
            Err(SourceError::Io { path: p, source }) => {
                assert!(p.ends_with("absent.tsv"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
