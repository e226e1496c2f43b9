//! The importer façade
//!
//! Orchestrates the whole import: version dispatch, section decoding into
//! transient records, and the two-pass cross-reference resolution that
//! turns per-file numeric ids into map table handles.
//!
//! Ids are never resolved while a section is still being decoded; a
//! combined symbol may reference a symbol that appears later in the same
//! section, and objects are decoded before anything guarantees their
//! symbols exist. Pass 1 only fills the id maps, pass 2 (`finish_import`)
//! rewrites references.

use crate::parameters::{GeorefParams, TabCodedString};
use crate::reader::ByteReader;
use crate::strings::{decode_pascal_utf8, decode_terminated_utf8, LegacyCodec};
use crate::version::{FileHeader, Layout, SectionType, TocEntry, TOC_ENTRY_LEN};
use crate::{Diagnostics, OcdError, Result};

use geo::Coord;
use orimap_map::{
    ColorCmyk, ColorRef, CoordFlags, DashScheme, Georeferencing, HatchPattern, HorizontalAlignment,
    LineCap, LineJoin, Map, MapColor, MapCoord, MapView, Object, ObjectKind, PointElement,
    PointElementKind, Symbol, SymbolKind, SymbolRef, Template, VerticalAlignment,
};

use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;

/// Fixed size of a V8 binary color record
const COLOR_RECORD_LEN: usize = 42;
/// Control-point handle factor for quarter-circle approximation
const BEZIER_KAPPA: f64 = 0.5523;
/// Upper bound on synthesized rectangle grid cells; a hostile cell size
/// can otherwise demand billions of objects
const MAX_GRID_CELLS: i64 = 10_000;

/// Parameter string types
const PARAM_GEOREF: i32 = 1;
const PARAM_VIEW: i32 = 2;
const PARAM_TEMPLATE: i32 = 3;
const PARAM_COLOR: i32 = 9;

/// Symbol record kinds
const SYM_POINT: u8 = 1;
const SYM_LINE: u8 = 2;
const SYM_AREA: u8 = 3;
const SYM_TEXT: u8 = 4;
const SYM_RECTANGLE: u8 = 5;
const SYM_COMBINED: u8 = 6;

/// Object record kinds
const OBJ_POINT: u8 = 1;
const OBJ_LINE: u8 = 2;
const OBJ_AREA: u8 = 3;
const OBJ_TEXT: u8 = 4;

/// Everything the import produced
#[derive(Debug)]
pub struct ImportOutput {
    pub map: Map,
    pub view: Option<MapView>,
    pub diagnostics: Diagnostics,
}

/// Transient description of a rectangle-style symbol
///
/// Rectangle symbols carry no stored geometry; objects using them get
/// their border, grid lines and cell numbers synthesized at the end of the
/// import, once the referenced symbols exist.
#[derive(Debug, Clone)]
struct RectangleInfo {
    border_line: SymbolRef,
    /// Corner radius in 1/1000 mm, 0 for square corners
    corner_radius: i64,
    has_grid: bool,
    inner_line: Option<SymbolRef>,
    text: Option<SymbolRef>,
    number_from_bottom: bool,
    cell_width: i64,
    cell_height: i64,
    unnumbered_cells: i32,
    unnumbered_text: String,
}

/// An object decoded from the file, waiting for symbol resolution
#[derive(Debug)]
struct PendingObject {
    symbol_number: i32,
    object: Object,
}

/// Importer for the legacy binary map format
pub struct OcdFileImport {
    data: Vec<u8>,
    codec: LegacyCodec,
    map: Map,
    view: Option<MapView>,
    diagnostics: Diagnostics,
    /// Per-file color id to color table handle (pass 1)
    color_index: HashMap<i32, ColorRef>,
    /// Per-file symbol id to symbol table handle (pass 1)
    symbol_index: HashMap<i32, SymbolRef>,
    /// Per-file symbol id to rectangle synthesis info
    rectangle_info: HashMap<i32, RectangleInfo>,
    /// Combined symbols whose part ids still need resolution
    pending_combined: Vec<(SymbolRef, i32, Vec<i32>)>,
    /// Part ids of the combined symbol record currently being decoded
    staged_part_numbers: Vec<i32>,
    /// Objects whose symbol ids still need resolution
    pending_objects: Vec<PendingObject>,
}

impl OcdFileImport {
    /// Create an importer over the raw file contents
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            codec: LegacyCodec::windows_1252(),
            map: Map::new(),
            view: None,
            diagnostics: Diagnostics::new(),
            color_index: HashMap::new(),
            symbol_index: HashMap::new(),
            rectangle_info: HashMap::new(),
            pending_combined: Vec::new(),
            staged_part_numbers: Vec::new(),
            pending_objects: Vec::new(),
        }
    }

    /// Create an importer reading the given file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Replace the code page used for legacy single-byte strings
    pub fn set_custom_encoding(&mut self, codec: LegacyCodec) {
        self.codec = codec;
    }

    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[inline]
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Run the decode passes.
    ///
    /// Fails only on an unsupported format version or a truncated
    /// mandatory header/table-of-contents; everything else degrades to
    /// diagnostics. With `load_symbols_only`, object, template and view
    /// sections are skipped (symbol-library preview).
    pub fn import(&mut self, load_symbols_only: bool) -> Result<()> {
        if let Err(err) = self.import_sections(load_symbols_only) {
            self.diagnostics.add_error(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    fn import_sections(&mut self, load_symbols_only: bool) -> Result<()> {
        let header = FileHeader::parse(&self.data)?;
        let layout = Layout::for_version(header.version)?;

        let toc = self.read_toc(&header)?;
        let strings = self.read_parameter_strings(&toc, layout);

        self.import_georeferencing(&strings);
        self.import_colors(&toc, &strings, layout);
        self.import_symbols(&toc, layout);

        if !load_symbols_only {
            self.import_objects(&toc, layout);
            self.import_templates(&strings);
            self.import_view(&strings);
        }

        Ok(())
    }

    /// Second pass: resolve numeric cross-references and synthesize
    /// deferred rectangle geometry.
    ///
    /// Unresolved object symbols are recoverable (the object stays, with
    /// a warning); unresolved combined-symbol parts leave a structural
    /// gap and make the whole import report failure, with all other
    /// references still resolved.
    pub fn finish_import(&mut self) -> Result<()> {
        let unresolved_parts = self.resolve_combined_symbols();
        self.resolve_objects()?;

        if unresolved_parts > 0 {
            let err = OcdError::UnresolvedParts {
                count: unresolved_parts,
            };
            self.diagnostics.add_error(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// Consume the importer, yielding the finished map and diagnostics
    pub fn into_output(self) -> ImportOutput {
        ImportOutput {
            map: self.map,
            view: self.view,
            diagnostics: self.diagnostics,
        }
    }

    // === Conversion helpers ===

    /// Convert a raw fixed-point file coordinate to a map coordinate.
    ///
    /// The low 8 bits of each component are flags; the value is the
    /// remaining bits in 1/100 mm. The shift must be arithmetic so that
    /// negative coordinates round towards negative infinity, and the Y
    /// axis is inverted (file Y grows up, map Y grows down).
    fn convert_point(x: i32, y: i32) -> MapCoord {
        let mut coord = MapCoord::from_raw(i64::from(x >> 8) * 10, i64::from(y >> 8) * -10);
        let x_flags = (x & 0xFF) as u8;
        let y_flags = (y & 0xFF) as u8;
        if x_flags & 0x01 != 0 {
            coord.flags.set(CoordFlags::CURVE_START);
        }
        if x_flags & 0x02 != 0 {
            coord.flags.set(CoordFlags::HOLE_POINT);
        }
        if y_flags & 0x01 != 0 {
            coord.flags.set(CoordFlags::GAP_POINT);
        }
        if y_flags & 0x02 != 0 {
            coord.flags.set(CoordFlags::CLOSE_POINT);
        }
        coord
    }

    /// Convert a file angle in tenths of a degree (counterclockwise) to
    /// radians in [0, 2*pi).
    ///
    /// The range is enforced: downstream hatching falls into an endless
    /// loop when sin(angle) goes negative, so raw negative angles are
    /// biased into the canonical range rather than passed through.
    fn convert_angle(raw: i32) -> f64 {
        f64::from((raw % 3600 + 3600) % 3600) * (PI / 1800.0)
    }

    /// Convert a file length in 1/100 mm to map units (1/1000 mm),
    /// promoting to 64 bits before scaling
    fn convert_length<T: Into<i64>>(raw: T) -> i64 {
        raw.into() * 10
    }

    /// Look up a file color id. Misses are recoverable: a warning is
    /// recorded and the reference stays absent.
    fn convert_color(&mut self, id: i32) -> Option<ColorRef> {
        if id < 0 {
            return None;
        }
        match self.color_index.get(&id) {
            Some(&color) => Some(color),
            None => {
                self.diagnostics
                    .add_warning(format!("Color id not found: {}, ignoring this color", id));
                None
            }
        }
    }

    /// Decode a fixed-width length-prefixed string field
    fn convert_string(&self, buf: &[u8], layout: Layout) -> String {
        if layout.utf8_strings {
            decode_pascal_utf8(buf)
        } else {
            self.codec.decode_pascal(buf)
        }
    }

    /// Decode a zero-terminated string within a declared buffer
    fn convert_terminated(&self, buf: &[u8], layout: Layout) -> String {
        if layout.utf8_strings {
            decode_terminated_utf8(buf)
        } else {
            self.codec.decode_terminated(buf)
        }
    }

    // === Table of contents ===

    fn read_toc(&self, header: &FileHeader) -> Result<Vec<TocEntry>> {
        let mut reader =
            ByteReader::at_offset(&self.data, header.toc_offset as usize, "table of contents")?;
        if reader.remaining() < header.toc_count as usize * TOC_ENTRY_LEN {
            return Err(OcdError::InvalidHeader(format!(
                "table of contents declares {} entries but the file ends early",
                header.toc_count
            )));
        }
        let mut entries = Vec::with_capacity(header.toc_count as usize);
        for _ in 0..header.toc_count {
            entries.push(TocEntry::parse(&mut reader)?);
        }
        Ok(entries)
    }

    fn find_section<'t>(toc: &'t [TocEntry], section: SectionType) -> Option<&'t TocEntry> {
        toc.iter().find(|e| e.section == section)
    }

    // === Parameter strings ===

    /// Decode the parameter string section into (type, text) pairs.
    /// Truncation aborts the section with a warning; everything decoded
    /// so far is kept.
    fn read_parameter_strings(&mut self, toc: &[TocEntry], layout: Layout) -> Vec<(i32, String)> {
        let Some(entry) = Self::find_section(toc, SectionType::Strings) else {
            return Vec::new();
        };
        let mut strings = Vec::new();
        let mut reader = match ByteReader::at_offset(&self.data, entry.offset as usize, "strings") {
            Ok(reader) => reader,
            Err(_) => {
                self.diagnostics
                    .add_warning("The parameter string section is out of bounds, skipping it");
                return strings;
            }
        };
        for _ in 0..entry.count {
            let result = (|| -> Result<(i32, String)> {
                let string_type = reader.read_i32()?;
                let size = reader.read_u32()? as usize;
                let bytes = reader.bytes(size)?;
                Ok((string_type, self.convert_terminated(bytes, layout)))
            })();
            match result {
                Ok(pair) => strings.push(pair),
                Err(_) => {
                    self.diagnostics.add_warning(
                        "The parameter string section is truncated, some entries were skipped",
                    );
                    break;
                }
            }
        }
        strings
    }

    // === Georeferencing ===

    fn import_georeferencing(&mut self, strings: &[(i32, String)]) {
        let Some((_, text)) = strings.iter().find(|(t, _)| *t == PARAM_GEOREF) else {
            return;
        };
        let params = GeorefParams::parse(text);
        for line in &params.unknown {
            self.diagnostics
                .add_warning(format!("Unknown georeferencing parameter: {}", line));
        }

        let mut georef = Georeferencing::new();
        if let Some(scale) = params.scale_denominator {
            georef.set_scale_denominator(scale);
        }
        if let Some((id, spec)) = &params.crs {
            if !georef.set_projected_crs(id, spec) {
                self.diagnostics.add_warning(format!(
                    "Unable to initialize projected CRS '{}', the map will not be georeferenced",
                    id
                ));
            }
        }
        if let Some((x, y)) = params.map_ref {
            georef.set_map_ref_point(MapCoord::from_mm(x, y));
        }
        if let Some((x, y)) = params.projected_ref {
            georef.set_projected_ref_point(Coord { x, y });
        }
        if let Some(declination) = params.declination {
            georef.set_declination(declination);
        } else {
            georef.init_declination();
        }
        self.map.set_georeferencing(georef);
    }

    // === Colors ===

    fn import_colors(&mut self, toc: &[TocEntry], strings: &[(i32, String)], layout: Layout) {
        if layout.colors_in_parameter_strings {
            for (_, text) in strings.iter().filter(|(t, _)| *t == PARAM_COLOR) {
                self.import_color_string(text);
            }
        } else {
            self.import_color_section(toc, layout);
        }
    }

    /// One tab-coded color parameter string (newer generations):
    /// `name\tn<id>\tc<cyan%>\tm..\ty..\tk..\to<overprint>`
    fn import_color_string(&mut self, text: &str) {
        let coded = TabCodedString::parse(text);
        let Some(number) = coded.find_parsed::<i32>('n') else {
            self.diagnostics
                .add_warning(format!("Color without id, ignoring: {}", coded.value));
            return;
        };
        let component = |code| coded.find_parsed::<f32>(code).unwrap_or(0.0) / 100.0;
        let mut color = MapColor::new(
            coded.value.clone(),
            ColorCmyk::new(component('c'), component('m'), component('y'), component('k')),
        );
        color.overprint = coded.find_parsed::<u8>('o').unwrap_or(0) != 0;
        color.knockout = !color.overprint;
        let handle = self.map.add_color(color);
        // Duplicate ids: the last record wins
        self.color_index.insert(number, handle);
    }

    /// The binary color table of the V8 generation
    fn import_color_section(&mut self, toc: &[TocEntry], layout: Layout) {
        let Some(entry) = Self::find_section(toc, SectionType::Colors) else {
            return;
        };
        let mut reader = match ByteReader::at_offset(&self.data, entry.offset as usize, "colors") {
            Ok(reader) => reader,
            Err(_) => {
                self.diagnostics
                    .add_warning("The color section is out of bounds, skipping it");
                return;
            }
        };
        for _ in 0..entry.count {
            let record = match reader.bytes(COLOR_RECORD_LEN) {
                Ok(record) => record,
                Err(_) => {
                    self.diagnostics.add_warning(
                        "The color section is truncated, some colors were skipped",
                    );
                    break;
                }
            };
            let mut record = ByteReader::new(record, "colors");
            // Fixed layout, reads cannot fail within the record
            let Ok(color) = (|| -> Result<(i32, MapColor)> {
                let number = i32::from(record.read_i16()?);
                record.skip(2)?; // reserved
                // Components are half-percents (0..=200)
                let c = f32::from(record.read_u8()?) / 200.0;
                let m = f32::from(record.read_u8()?) / 200.0;
                let y = f32::from(record.read_u8()?) / 200.0;
                let k = f32::from(record.read_u8()?) / 200.0;
                let overprint = record.read_u8()? != 0;
                record.skip(1)?; // reserved
                let name = self.convert_string(record.bytes(32)?, layout);
                let mut color = MapColor::new(name, ColorCmyk::new(c, m, y, k));
                color.overprint = overprint;
                color.knockout = !overprint;
                Ok((number, color))
            })() else {
                break;
            };
            let (number, color) = color;
            let handle = self.map.add_color(color);
            self.color_index.insert(number, handle);
        }
    }

    // === Symbols ===

    fn import_symbols(&mut self, toc: &[TocEntry], layout: Layout) {
        let Some(entry) = Self::find_section(toc, SectionType::Symbols) else {
            return;
        };
        let mut offset = entry.offset as usize;
        for _ in 0..entry.count {
            match self.import_symbol_record(offset, layout) {
                Ok(record_size) => offset += record_size,
                Err(_) => {
                    self.diagnostics.add_warning(
                        "The symbol section is truncated, some symbols were skipped",
                    );
                    break;
                }
            }
        }
    }

    /// Decode one symbol record; returns its declared size for walking
    /// to the next record
    fn import_symbol_record(&mut self, offset: usize, layout: Layout) -> Result<usize> {
        let mut sizer = ByteReader::at_offset(&self.data, offset, "symbols")?;
        let record_size = sizer.read_u32()? as usize;
        if record_size < 4 || offset + record_size > self.data.len() {
            return Err(OcdError::UnexpectedEof {
                section: "symbols",
                offset,
            });
        }
        // Copy the record out so decoding can borrow the importer mutably
        let record_bytes = self.data[offset + 4..offset + record_size].to_vec();
        let mut record = ByteReader::new(&record_bytes, "symbols");

        let number = record.read_i32()?;
        let kind = record.read_u8()?;
        let flags = record.read_u8()?;
        let main_color = i32::from(record.read_i16()?);
        let name = self.convert_string(record.bytes(layout.symbol_name_len)?, layout);

        let symbol_kind = match kind {
            SYM_POINT => self.decode_point_symbol(&mut record, main_color),
            SYM_LINE => self.decode_line_symbol(&mut record, main_color),
            SYM_AREA => self.decode_area_symbol(&mut record, main_color),
            SYM_TEXT => self.decode_text_symbol(&mut record, main_color, layout),
            SYM_RECTANGLE => {
                self.decode_rectangle_symbol(&mut record, main_color, number, &name, layout)?;
                return Ok(record_size);
            }
            SYM_COMBINED => self.decode_combined_symbol(&mut record, number),
            unknown => {
                self.diagnostics.add_warning(format!(
                    "Symbol {}: unsupported type ({}), skipping this symbol",
                    number, unknown
                ));
                return Ok(record_size);
            }
        };

        match symbol_kind {
            Ok(symbol_kind) => {
                let part_numbers = match &symbol_kind {
                    // Remember raw part ids for the resolution pass
                    SymbolKind::Combined { .. } => Some(self.taken_part_numbers()),
                    _ => None,
                };
                let mut symbol = Symbol::new(name, symbol_kind);
                symbol.source_number = number;
                symbol.is_helper = flags & 0x01 != 0;
                symbol.is_hidden = flags & 0x02 != 0;
                symbol.is_protected = flags & 0x04 != 0;
                let handle = self.map.add_symbol(symbol);
                self.symbol_index.insert(number, handle);
                if let Some(part_numbers) = part_numbers {
                    self.pending_combined.push((handle, number, part_numbers));
                }
            }
            Err(_) => {
                self.diagnostics.add_warning(format!(
                    "Symbol {}: the record is too short, skipping this symbol",
                    number
                ));
            }
        }
        Ok(record_size)
    }

    fn decode_point_symbol(
        &mut self,
        record: &mut ByteReader<'_>,
        _main_color: i32,
    ) -> Result<SymbolKind> {
        let inner_color = i32::from(record.read_i16()?);
        let inner_radius = Self::convert_length(record.read_i32()?);
        let element_count = record.read_u16()?;
        let mut elements = Vec::with_capacity(usize::from(element_count));
        for _ in 0..element_count {
            let kind = match record.read_u8()? {
                1 => PointElementKind::Line,
                2 => PointElementKind::Area,
                3 => PointElementKind::Circle,
                _ => PointElementKind::Dot,
            };
            record.skip(1)?; // reserved
            let color = i32::from(record.read_i16()?);
            let line_width = Self::convert_length(record.read_i32()?);
            let diameter = Self::convert_length(record.read_i32()?);
            let coord_count = record.read_u16()?;
            record.skip(2)?; // reserved
            let mut coords = Vec::with_capacity(usize::from(coord_count));
            for _ in 0..coord_count {
                let x = record.read_i32()?;
                let y = record.read_i32()?;
                coords.push(Self::convert_point(x, y));
            }
            let color = self.convert_color(color);
            elements.push(PointElement {
                kind,
                color,
                line_width,
                diameter,
                coords,
            });
        }
        Ok(SymbolKind::Point {
            inner_color: self.convert_color(inner_color),
            inner_radius,
            elements,
        })
    }

    fn decode_line_symbol(
        &mut self,
        record: &mut ByteReader<'_>,
        main_color: i32,
    ) -> Result<SymbolKind> {
        let line_width = Self::convert_length(record.read_i32()?);
        let cap = match record.read_u8()? {
            1 => LineCap::Round,
            2 => LineCap::Square,
            3 => LineCap::Pointed,
            _ => LineCap::Flat,
        };
        let join = match record.read_u8()? {
            1 => LineJoin::Round,
            2 => LineJoin::Bevel,
            _ => LineJoin::Miter,
        };
        let dashed = record.read_u8()? != 0;
        record.skip(1)?; // reserved
        let dash = DashScheme {
            dashed,
            main_length: Self::convert_length(record.read_i32()?),
            end_length: Self::convert_length(record.read_i32()?),
            main_gap: Self::convert_length(record.read_i32()?),
            secondary_gap: Self::convert_length(record.read_i32()?),
        };
        Ok(SymbolKind::Line {
            color: self.convert_color(main_color),
            line_width,
            cap,
            join,
            dash,
        })
    }

    fn decode_area_symbol(
        &mut self,
        record: &mut ByteReader<'_>,
        main_color: i32,
    ) -> Result<SymbolKind> {
        let filled = record.read_u8()? != 0;
        let hatch_count = record.read_u8()?;
        record.skip(2)?; // reserved
        let mut hatch = Vec::with_capacity(usize::from(hatch_count));
        for _ in 0..hatch_count {
            let color = i32::from(record.read_i16()?);
            let angle = Self::convert_angle(i32::from(record.read_i16()?));
            let line_width = Self::convert_length(record.read_i32()?);
            let spacing = Self::convert_length(record.read_i32()?);
            let color = self.convert_color(color);
            hatch.push(HatchPattern {
                color,
                angle,
                line_width,
                spacing,
            });
        }
        let fill_color = if filled {
            self.convert_color(main_color)
        } else {
            None
        };
        Ok(SymbolKind::Area { fill_color, hatch })
    }

    fn decode_text_symbol(
        &mut self,
        record: &mut ByteReader<'_>,
        main_color: i32,
        layout: Layout,
    ) -> Result<SymbolKind> {
        let font_size = Self::convert_length(record.read_i32()?);
        let bold = record.read_u8()? != 0;
        let italic = record.read_u8()? != 0;
        let underline = record.read_u8()? != 0;
        let halign = match record.read_u8()? {
            1 => HorizontalAlignment::Center,
            2 => HorizontalAlignment::Right,
            _ => HorizontalAlignment::Left,
        };
        let valign = match record.read_u8()? {
            1 => VerticalAlignment::Top,
            2 => VerticalAlignment::Center,
            3 => VerticalAlignment::Bottom,
            _ => VerticalAlignment::Baseline,
        };
        record.skip(1)?; // reserved
        let line_spacing = f64::from(record.read_u16()?) / 100.0;
        let char_spacing = Self::convert_length(record.read_i32()?);
        let font_family = self.convert_terminated(record.bytes(32)?, layout);
        Ok(SymbolKind::Text {
            color: self.convert_color(main_color),
            font_family,
            font_size,
            bold,
            italic,
            underline,
            line_spacing,
            char_spacing,
            halign,
            valign,
        })
    }

    /// A rectangle symbol is decomposed into up to three real symbols
    /// (border line, grid line, cell number text) plus transient
    /// synthesis info consumed during object resolution
    fn decode_rectangle_symbol(
        &mut self,
        record: &mut ByteReader<'_>,
        main_color: i32,
        number: i32,
        name: &str,
        layout: Layout,
    ) -> Result<()> {
        let line_width = Self::convert_length(record.read_i32()?);
        let corner_radius = Self::convert_length(record.read_i32()?);
        let has_grid = record.read_u8()? != 0;
        let number_from_bottom = record.read_u8()? != 0;
        let grid_color = i32::from(record.read_i16()?);
        let cell_width = Self::convert_length(record.read_i32()?);
        let cell_height = Self::convert_length(record.read_i32()?);
        let unnumbered_cells = record.read_i32()?;
        let text_size = Self::convert_length(record.read_i32()?);
        let unnumbered_text = self.convert_terminated(record.bytes(16)?, layout);

        let border_color = self.convert_color(main_color);
        let mut border = Symbol::new(
            name,
            SymbolKind::Line {
                color: border_color,
                line_width,
                cap: LineCap::Flat,
                join: LineJoin::Miter,
                dash: DashScheme::default(),
            },
        );
        border.source_number = number;
        let border_line = self.map.add_symbol(border);
        self.symbol_index.insert(number, border_line);

        let (inner_line, text) = if has_grid {
            let grid_color = self.convert_color(grid_color);
            let inner = Symbol::new(
                format!("{} grid", name),
                SymbolKind::Line {
                    color: grid_color,
                    line_width: (line_width / 2).max(1),
                    cap: LineCap::Flat,
                    join: LineJoin::Miter,
                    dash: DashScheme::default(),
                },
            );
            let text = Symbol::new(
                format!("{} numbering", name),
                SymbolKind::Text {
                    color: grid_color,
                    font_family: String::from("Arial"),
                    font_size: text_size,
                    bold: false,
                    italic: false,
                    underline: false,
                    line_spacing: 1.0,
                    char_spacing: 0,
                    halign: HorizontalAlignment::Center,
                    valign: VerticalAlignment::Center,
                },
            );
            (Some(self.map.add_symbol(inner)), Some(self.map.add_symbol(text)))
        } else {
            (None, None)
        };

        self.rectangle_info.insert(
            number,
            RectangleInfo {
                border_line,
                corner_radius,
                has_grid,
                inner_line,
                text,
                number_from_bottom,
                cell_width,
                cell_height,
                unnumbered_cells,
                unnumbered_text,
            },
        );
        Ok(())
    }

    fn decode_combined_symbol(
        &mut self,
        record: &mut ByteReader<'_>,
        _number: i32,
    ) -> Result<SymbolKind> {
        let part_count = usize::from(record.read_u16()?).clamp(2, 5);
        record.skip(2)?; // reserved
        let mut part_numbers = Vec::with_capacity(part_count);
        for _ in 0..part_count {
            part_numbers.push(record.read_i32()?);
        }
        self.staged_part_numbers = part_numbers;
        Ok(SymbolKind::Combined {
            parts: (0..part_count).map(|_| None).collect(),
        })
    }

    fn taken_part_numbers(&mut self) -> Vec<i32> {
        std::mem::take(&mut self.staged_part_numbers)
    }

    // === Objects ===

    fn import_objects(&mut self, toc: &[TocEntry], layout: Layout) {
        let Some(entry) = Self::find_section(toc, SectionType::Objects) else {
            return;
        };
        let mut offset = entry.offset as usize;
        for _ in 0..entry.count {
            match self.import_object_record(offset, layout) {
                Ok(record_size) => offset += record_size,
                Err(_) => {
                    self.diagnostics.add_warning(
                        "The object section is truncated, some objects were skipped",
                    );
                    break;
                }
            }
        }
    }

    fn import_object_record(&mut self, offset: usize, layout: Layout) -> Result<usize> {
        let mut sizer = ByteReader::at_offset(&self.data, offset, "objects")?;
        let record_size = sizer.read_u32()? as usize;
        if record_size < 4 || offset + record_size > self.data.len() {
            return Err(OcdError::UnexpectedEof {
                section: "objects",
                offset,
            });
        }
        let record_bytes = self.data[offset + 4..offset + record_size].to_vec();
        let mut record = ByteReader::new(&record_bytes, "objects");

        let symbol_number = record.read_i32()?;
        let kind = record.read_u8()?;
        record.skip(1)?; // reserved
        let angle = i32::from(record.read_i16()?);
        let coord_count = record.read_u32()? as usize;
        let text_len = record.read_u32()? as usize;

        // Cap the preallocation by the bytes actually present; the
        // declared count is untrusted and may be absurd
        let mut coords = Vec::with_capacity(coord_count.min(record.remaining() / 8));
        let decoded = (|| -> Result<()> {
            for _ in 0..coord_count {
                let x = record.read_i32()?;
                let y = record.read_i32()?;
                coords.push(Self::convert_point(x, y));
            }
            Ok(())
        })();
        if decoded.is_err() {
            self.diagnostics.add_warning(format!(
                "Object with symbol id {}: coordinates are truncated, skipping this object",
                symbol_number
            ));
            return Ok(record_size);
        }

        let object_kind = match kind {
            OBJ_POINT => {
                let anchor = coords.first().copied().unwrap_or_default();
                ObjectKind::Point { anchor }
            }
            OBJ_LINE => ObjectKind::Path {
                coords,
                closed: false,
            },
            OBJ_AREA => ObjectKind::Path {
                coords,
                closed: true,
            },
            OBJ_TEXT => {
                let text = match record.bytes(text_len) {
                    Ok(bytes) => self.convert_terminated(bytes, layout),
                    Err(_) => {
                        self.diagnostics.add_warning(format!(
                            "Object with symbol id {}: text is truncated",
                            symbol_number
                        ));
                        String::new()
                    }
                };
                ObjectKind::Text {
                    coords,
                    text,
                    halign: HorizontalAlignment::default(),
                    valign: VerticalAlignment::default(),
                }
            }
            unknown => {
                self.diagnostics.add_warning(format!(
                    "Unsupported object type ({}) for symbol id {}, skipping this object",
                    unknown, symbol_number
                ));
                return Ok(record_size);
            }
        };

        let mut object = Object::new(None, object_kind);
        object.rotation = Self::convert_angle(angle);
        self.pending_objects.push(PendingObject {
            symbol_number,
            object,
        });
        Ok(record_size)
    }

    // === Templates and view settings ===

    /// Template parameter strings: `path\tx<mm>\ty<mm>\ts<scale>\tr<degrees>`
    fn import_templates(&mut self, strings: &[(i32, String)]) {
        for (_, text) in strings.iter().filter(|(t, _)| *t == PARAM_TEMPLATE) {
            let coded = TabCodedString::parse(text);
            let path = coded.value.clone();
            let extension = Path::new(&path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            const KNOWN: [&str; 8] = ["bmp", "gif", "jpg", "jpeg", "png", "tif", "tiff", "ocd"];
            if !KNOWN.contains(&extension.as_str()) {
                self.diagnostics
                    .add_warning(format!("Unable to import template: {}", path));
                continue;
            }
            let x = coded.find_parsed::<f64>('x').unwrap_or(0.0);
            let y = coded.find_parsed::<f64>('y').unwrap_or(0.0);
            let scale = coded.find_parsed::<f64>('s').unwrap_or(1.0);
            let rotation = coded
                .find_parsed::<f64>('r')
                .unwrap_or(0.0)
                .to_radians();
            self.map.add_template(Template {
                path,
                offset: MapCoord::from_mm(x, y),
                scale,
                rotation,
            });
        }
    }

    /// View parameter strings: `\tz<zoom>\tx<mm>\ty<mm>`
    fn import_view(&mut self, strings: &[(i32, String)]) {
        let Some((_, text)) = strings.iter().find(|(t, _)| *t == PARAM_VIEW) else {
            return;
        };
        let coded = TabCodedString::parse(text);
        let zoom = coded.find_parsed::<f64>('z').unwrap_or(1.0);
        let x = coded.find_parsed::<f64>('x').unwrap_or(0.0);
        let y = coded.find_parsed::<f64>('y').unwrap_or(0.0);
        let view = MapView {
            zoom,
            center: MapCoord::from_mm(x, y),
        };
        self.map.set_view(view.clone());
        self.view = Some(view);
    }

    // === Resolution pass ===

    /// Rewrite combined-symbol part ids into symbol table handles.
    /// Returns the number of part references that could not be resolved.
    fn resolve_combined_symbols(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_combined);
        let mut unresolved = 0;
        for (handle, number, part_numbers) in pending {
            for (slot, part_number) in part_numbers.iter().enumerate() {
                if *part_number < 0 {
                    continue; // deliberately empty slot
                }
                match self.symbol_index.get(part_number) {
                    Some(&part) => {
                        if let Some(symbol) = self.map.symbol_mut(handle) {
                            symbol.set_part(slot, Some(part));
                        }
                    }
                    None => {
                        unresolved += 1;
                        self.diagnostics.add_warning(format!(
                            "Combined symbol {}: part symbol id {} not found",
                            number, part_number
                        ));
                    }
                }
            }
        }
        unresolved
    }

    /// Resolve object symbol ids and add the objects to the map,
    /// synthesizing rectangle geometry where needed
    fn resolve_objects(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_objects);
        for PendingObject {
            symbol_number,
            mut object,
        } in pending
        {
            if let Some(info) = self.rectangle_info.get(&symbol_number).cloned() {
                self.synthesize_rectangle_object(&object, symbol_number, &info)?;
                continue;
            }

            match self.symbol_index.get(&symbol_number) {
                Some(&symbol) => {
                    object.symbol = Some(symbol);
                    // Text alignment lives on the symbol in this format
                    // but on the object in the model
                    if let (
                        Some(Symbol {
                            kind:
                                SymbolKind::Text {
                                    halign: symbol_halign,
                                    valign: symbol_valign,
                                    ..
                                },
                            ..
                        }),
                        ObjectKind::Text { halign, valign, .. },
                    ) = (self.map.symbol(symbol), &mut object.kind)
                    {
                        *halign = *symbol_halign;
                        *valign = *symbol_valign;
                    }
                }
                None => {
                    self.diagnostics.add_warning(format!(
                        "Symbol id not found: {}, object created without symbol",
                        symbol_number
                    ));
                }
            }
            self.map.add_object(0, object)?;
        }
        Ok(())
    }

    // === Rectangle synthesis ===

    /// Build the border path, grid lines and cell numbers for one
    /// rectangle object from its four decoded corner points
    fn synthesize_rectangle_object(
        &mut self,
        object: &Object,
        symbol_number: i32,
        info: &RectangleInfo,
    ) -> Result<()> {
        let coords = object.coords();
        if coords.len() < 4 {
            self.diagnostics.add_warning(format!(
                "Invalid rectangle object for symbol {}, skipping it",
                symbol_number
            ));
            return Ok(());
        }
        let min_x = coords.iter().map(|c| c.x).min().unwrap_or(0);
        let max_x = coords.iter().map(|c| c.x).max().unwrap_or(0);
        let min_y = coords.iter().map(|c| c.y).min().unwrap_or(0);
        let max_y = coords.iter().map(|c| c.y).max().unwrap_or(0);

        let border = self.rectangle_border_path(min_x, min_y, max_x, max_y, info.corner_radius);
        let mut border_object = Object::new(
            Some(info.border_line),
            ObjectKind::Path {
                coords: border,
                closed: true,
            },
        );
        border_object.rotation = object.rotation;
        self.map.add_object(0, border_object)?;

        if info.has_grid && info.cell_width > 0 && info.cell_height > 0 {
            self.synthesize_rectangle_grid(min_x, min_y, max_x, max_y, symbol_number, info)?;
        }
        Ok(())
    }

    /// Closed border outline, with rounded corners when a radius is set
    fn rectangle_border_path(
        &self,
        min_x: i64,
        min_y: i64,
        max_x: i64,
        max_y: i64,
        radius: i64,
    ) -> Vec<MapCoord> {
        if radius <= 0 {
            return vec![
                MapCoord::from_raw(min_x, min_y),
                MapCoord::from_raw(max_x, min_y),
                MapCoord::from_raw(max_x, max_y),
                MapCoord::from_raw(min_x, max_y).with_flags(CoordFlags::CLOSE_POINT),
            ];
        }
        let r = radius.min((max_x - min_x) / 2).min((max_y - min_y) / 2);
        let k = (r as f64 * BEZIER_KAPPA).round() as i64;
        let mut path = Vec::with_capacity(16);
        // Clockwise from the top-left corner's end point, one straight
        // edge and one quarter-circle curve per corner
        path.push(MapCoord::from_raw(min_x + r, min_y));
        path.push(MapCoord::from_raw(max_x - r, min_y).with_flags(CoordFlags::CURVE_START));
        path.push(MapCoord::from_raw(max_x - r + k, min_y));
        path.push(MapCoord::from_raw(max_x, min_y + r - k));
        path.push(MapCoord::from_raw(max_x, min_y + r));
        path.push(MapCoord::from_raw(max_x, max_y - r).with_flags(CoordFlags::CURVE_START));
        path.push(MapCoord::from_raw(max_x, max_y - r + k));
        path.push(MapCoord::from_raw(max_x - r + k, max_y));
        path.push(MapCoord::from_raw(max_x - r, max_y));
        path.push(MapCoord::from_raw(min_x + r, max_y).with_flags(CoordFlags::CURVE_START));
        path.push(MapCoord::from_raw(min_x + r - k, max_y));
        path.push(MapCoord::from_raw(min_x, max_y - r + k));
        path.push(MapCoord::from_raw(min_x, max_y - r));
        path.push(MapCoord::from_raw(min_x, min_y + r).with_flags(CoordFlags::CURVE_START));
        path.push(MapCoord::from_raw(min_x, min_y + r - k));
        path.push(MapCoord::from_raw(min_x + r - k, min_y));
        let mut close = MapCoord::from_raw(min_x + r, min_y);
        close.flags.set(CoordFlags::CLOSE_POINT);
        path.push(close);
        path
    }

    /// Inner grid lines and cell numbering. Rows are anchored at the
    /// bottom edge (map Y grows down, so the bottom is max Y).
    fn synthesize_rectangle_grid(
        &mut self,
        min_x: i64,
        min_y: i64,
        max_x: i64,
        max_y: i64,
        symbol_number: i32,
        info: &RectangleInfo,
    ) -> Result<()> {
        let columns = ((max_x - min_x) / info.cell_width).max(1);
        let rows = ((max_y - min_y) / info.cell_height).max(1);
        let total_cells = rows * columns;
        if total_cells > MAX_GRID_CELLS {
            self.diagnostics.add_warning(format!(
                "Rectangle grid for symbol {}: {} cells exceed the limit of {}, skipping the grid",
                symbol_number, total_cells, MAX_GRID_CELLS
            ));
            return Ok(());
        }

        if let Some(inner_line) = info.inner_line {
            let mut x = min_x + info.cell_width;
            while x < max_x {
                self.map.add_object(
                    0,
                    Object::new(
                        Some(inner_line),
                        ObjectKind::Path {
                            coords: vec![
                                MapCoord::from_raw(x, min_y),
                                MapCoord::from_raw(x, max_y),
                            ],
                            closed: false,
                        },
                    ),
                )?;
                x += info.cell_width;
            }
            let mut y = max_y - info.cell_height;
            while y > min_y {
                self.map.add_object(
                    0,
                    Object::new(
                        Some(inner_line),
                        ObjectKind::Path {
                            coords: vec![
                                MapCoord::from_raw(min_x, y),
                                MapCoord::from_raw(max_x, y),
                            ],
                            closed: false,
                        },
                    ),
                )?;
                y -= info.cell_height;
            }
        }

        let Some(text_symbol) = info.text else {
            return Ok(());
        };
        let numbered_cells = (total_cells - i64::from(info.unnumbered_cells)).max(0);
        for cell in 0..total_cells {
            let row = cell / columns;
            let column = cell % columns;
            let label = if cell < numbered_cells {
                (cell + 1).to_string()
            } else if !info.unnumbered_text.is_empty() {
                info.unnumbered_text.clone()
            } else {
                continue;
            };
            // Cell (0, 0) is bottom-left when numbering from the bottom
            let center_x = min_x + column * info.cell_width + info.cell_width / 2;
            let center_y = if info.number_from_bottom {
                max_y - row * info.cell_height - info.cell_height / 2
            } else {
                min_y + row * info.cell_height + info.cell_height / 2
            };
            self.map.add_object(
                0,
                Object::new(
                    Some(text_symbol),
                    ObjectKind::Text {
                        coords: vec![MapCoord::from_raw(center_x, center_y)],
                        text: label,
                        halign: HorizontalAlignment::Center,
                        valign: VerticalAlignment::Center,
                    },
                ),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_point_scales_and_flips_y() {
        // value 100 (1/100 mm) in the high 24 bits, no flags
        let c = OcdFileImport::convert_point(100 << 8, 50 << 8);
        assert_eq!(c.x, 1000);
        assert_eq!(c.y, -500);
        assert_eq!(c.flags, CoordFlags::NONE);
    }

    #[test]
    fn test_convert_point_negative_rounds_down() {
        // Arithmetic shift: -1 >> 8 stays -1
        let c = OcdFileImport::convert_point(-1 << 8, -256);
        assert_eq!(c.x, -10);
        assert_eq!(c.y, 10);
    }

    #[test]
    fn test_convert_point_extracts_flags() {
        let c = OcdFileImport::convert_point((100 << 8) | 0x01, (100 << 8) | 0x02);
        assert!(c.flags.is_curve_start());
        assert!(c.flags.is_close_point());
        assert!(!c.flags.is_hole_point());
        assert!(!c.flags.is_gap_point());
    }

    #[test]
    fn test_convert_angle_canonical_range() {
        assert_eq!(OcdFileImport::convert_angle(0), 0.0);
        let a = OcdFileImport::convert_angle(900);
        assert!((a - PI / 2.0).abs() < 1e-12);
        // Negative angles are biased into [0, 2*pi)
        let b = OcdFileImport::convert_angle(-900);
        assert!((b - 3.0 * PI / 2.0).abs() < 1e-12);
        // Multiples of a full turn collapse to zero
        assert_eq!(OcdFileImport::convert_angle(7200), 0.0);
    }

    #[test]
    fn test_convert_point_roundtrip_within_resolution() {
        // Map units are 10x finer than the file's 1/100 mm grid, so
        // re-encoding a converted coordinate must recover the original
        // value bits exactly
        let samples = [
            0,
            1 << 8,
            -(1 << 8),
            12345 << 8,
            (777 << 8) | 0x03,
            i32::MIN / 2,
            i32::MAX / 2,
        ];
        for raw in samples {
            let c = OcdFileImport::convert_point(raw, raw);
            assert_eq!(c.x % 10, 0);
            assert_eq!(c.y % 10, 0);
            assert_eq!(((c.x / 10) as i32) << 8, raw & !0xFF);
            assert_eq!(((-c.y / 10) as i32) << 8, raw & !0xFF);
        }
    }

    #[test]
    fn test_convert_angle_idempotent() {
        for raw in (-7200..=7200).step_by(37) {
            let a = OcdFileImport::convert_angle(raw);
            assert!((0.0..2.0 * PI).contains(&a));
            // Feeding back the canonical tenth-degree value is a no-op
            let canonical = ((raw % 3600) + 3600) % 3600;
            assert_eq!(OcdFileImport::convert_angle(canonical), a);
        }
    }

    #[test]
    fn test_convert_length_promotes() {
        assert_eq!(OcdFileImport::convert_length(150), 1500);
        assert_eq!(OcdFileImport::convert_length(i32::MAX), i64::from(i32::MAX) * 10);
        assert_eq!(OcdFileImport::convert_length(-30), -300);
    }

    #[test]
    fn test_convert_color_miss_warns_once_per_call() {
        let mut import = OcdFileImport::new(Vec::new());
        assert_eq!(import.convert_color(-1), None);
        assert!(import.diagnostics.warnings().is_empty());

        assert_eq!(import.convert_color(9), None);
        assert_eq!(import.diagnostics.warnings().len(), 1);
        assert!(import.diagnostics.warnings()[0].contains("Color id not found: 9"));
    }

    #[test]
    fn test_rectangle_border_path_square_corners() {
        let import = OcdFileImport::new(Vec::new());
        let path = import.rectangle_border_path(0, 0, 10000, 5000, 0);
        assert_eq!(path.len(), 4);
        assert!(path[3].flags.is_close_point());
    }

    #[test]
    fn test_rectangle_border_path_rounded_corners() {
        let import = OcdFileImport::new(Vec::new());
        let path = import.rectangle_border_path(0, 0, 10000, 5000, 1000);
        assert_eq!(path.len(), 17);
        let curve_starts = path.iter().filter(|c| c.flags.is_curve_start()).count();
        assert_eq!(curve_starts, 4);
        assert!(path.last().unwrap().flags.is_close_point());
    }
}
