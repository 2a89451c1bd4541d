//! Declarative source-field → destination-field mapping per insumo type.
//!
//! Upstream extracts rarely agree on column names, so each logical field
//! carries an ordered candidate list; the first source column whose
//! normalized name matches wins. A file where no declared field resolves at
//! all is the wrong file type and is rejected before anything is written.

use std::path::Path;

use log::debug;

use crate::error::{MergeError, Result};
use crate::header::HeaderMap;
use crate::table::SourceTable;

/// Candidate source names for the personnel natural key.
pub const DOCUMENT: &[&str] = &[
    "documento",
    "cedula",
    "numero documento",
    "no. documento",
    "no documento",
    "documento de identidad",
];
const FULL_NAME: &[&str] = &["nombre completo", "nombres y apellidos"];
const FIRST_NAME: &[&str] = &["primer nombre", "nombre 1", "firstname"];
const MIDDLE_NAME: &[&str] = &["segundo nombre", "nombre 2"];
const FIRST_SURNAME: &[&str] = &["primer apellido", "apellido 1", "lastname"];
const SECOND_SURNAME: &[&str] = &["segundo apellido", "apellido 2"];
const DEPARTMENT: &[&str] = &["dependencia", "centro de costos", "centro costos"];
const AREA: &[&str] = &["area", "regional"];
const TERMINATION_DATE: &[&str] = &["fecha terminacion", "fecha_terminacion", "fecha retiro"];
const END_DATE: &[&str] = &["fecha fin", "fechafin"];
const START_DATE: &[&str] = &["fecha inicio", "fecha ingreso", "fechaingreso"];

const MACHINE: &[&str] = &["nombre de equipo", "equipo", "computer name", "device name"];
const IP: &[&str] = &["ip", "direccion ip", "ip address"];
const MAC: &[&str] = &["mac", "mac address", "direccion mac"];
const LAST_USER: &[&str] = &[
    "last logged on user",
    "last logged-on user",
    "ultimo usuario",
    "last user",
];
const PROTECTION: &[&str] = &["protection manager", "gestor de proteccion"];

/// Source columns resolved for a personnel insumo (0-based indices).
///
/// A missing field is not an error; the destination cell is simply left
/// unset for that row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersonnelColumns {
    pub document: Option<usize>,
    pub full_name: Option<usize>,
    pub first_name: Option<usize>,
    pub middle_name: Option<usize>,
    pub first_surname: Option<usize>,
    pub second_surname: Option<usize>,
    pub department: Option<usize>,
    pub area: Option<usize>,
    pub termination_date: Option<usize>,
    pub end_date: Option<usize>,
    pub start_date: Option<usize>,
}

impl PersonnelColumns {
    /// Resolves the declared fields against `table`.
    pub fn resolve(table: &SourceTable, path: &Path) -> Result<Self> {
        let columns = Self {
            document: table.first_match(DOCUMENT),
            full_name: table.first_match(FULL_NAME),
            first_name: table.first_match(FIRST_NAME),
            middle_name: table.first_match(MIDDLE_NAME),
            first_surname: table.first_match(FIRST_SURNAME),
            second_surname: table.first_match(SECOND_SURNAME),
            department: table.first_match(DEPARTMENT),
            area: table.first_match(AREA),
            termination_date: table.first_match(TERMINATION_DATE),
            end_date: table.first_match(END_DATE),
            start_date: table.first_match(START_DATE),
        };
        if columns == Self::default() {
            return Err(MergeError::Schema {
                path: path.to_path_buf(),
                expected: primary_names(&[
                    DOCUMENT,
                    FULL_NAME,
                    FIRST_NAME,
                    FIRST_SURNAME,
                    DEPARTMENT,
                    AREA,
                    TERMINATION_DATE,
                    START_DATE,
                ]),
            });
        }
        debug!("resolved personnel columns from {}", path.display());
        Ok(columns)
    }
}

/// Source columns resolved for an endpoint/antivirus insumo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointColumns {
    pub machine: Option<usize>,
    pub ip: Option<usize>,
    pub mac: Option<usize>,
    pub last_user: Option<usize>,
    pub protection: Option<usize>,
}

impl EndpointColumns {
    /// Resolves the declared fields against `table`.
    pub fn resolve(table: &SourceTable, path: &Path) -> Result<Self> {
        let columns = Self {
            machine: table.first_match(MACHINE),
            ip: table.first_match(IP),
            mac: table.first_match(MAC),
            last_user: table.first_match(LAST_USER),
            protection: table.first_match(PROTECTION),
        };
        if columns == Self::default() {
            return Err(MergeError::Schema {
                path: path.to_path_buf(),
                expected: primary_names(&[MACHINE, IP, MAC, LAST_USER, PROTECTION]),
            });
        }
        debug!("resolved endpoint columns from {}", path.display());
        Ok(columns)
    }
}

/// Destination columns for the personnel sheet (1-indexed).
#[derive(Debug, Clone, Copy)]
pub struct PersonnelTargets {
    pub key: u32,
    pub name: Option<u32>,
    pub department: Option<u32>,
    pub area: Option<u32>,
    pub status: Option<u32>,
    pub date: Option<u32>,
}

impl PersonnelTargets {
    /// `None` when the mandatory key column is absent from the headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        Some(Self {
            key: headers.get("CEDULA")?,
            name: headers.get("NOMBRE"),
            department: headers.get("DEPENDENCIA"),
            area: headers.get("AREA"),
            status: headers.get("ESTADO"),
            date: headers.first(&["INGRESO/RETIRO", "INGRESO", "FECHA"]),
        })
    }
}

/// Destination columns for the antivirus sheet (1-indexed).
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointTargets {
    pub machine: Option<u32>,
    pub ip: Option<u32>,
    pub mac: Option<u32>,
    pub last_user: Option<u32>,
    pub protection: Option<u32>,
    pub status: Option<u32>,
}

impl EndpointTargets {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            machine: headers.first(MACHINE),
            ip: headers.first(IP),
            mac: headers.first(MAC),
            last_user: headers.first(LAST_USER),
            protection: headers.first(PROTECTION),
            status: headers.get("Estado"),
        }
    }
}

/// First candidate of each field, joined for `SchemaError` messages.
fn primary_names(fields: &[&[&str]]) -> String {
    fields
        .iter()
        .filter_map(|candidates| candidates.first().copied())
        .collect::<Vec<_>>()
        .join(", ")
}
