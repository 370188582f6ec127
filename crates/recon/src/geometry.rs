//! Planar geometry values, bounds, and WKT read/write.
//!
//! Geometry is opaque to the attribute path; the geometry diff only needs
//! exact equality, the ranker hands geometries to a `GeometryBackend`.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Geometry family of a feature layer. Selects the ranking channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Polyline,
    Polygon,
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point => write!(f, "point"),
            Self::Polyline => write!(f, "polyline"),
            Self::Polygon => write!(f, "polygon"),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Exact representation equality. Bit-identical NaNs compare equal so that
/// `g == g` holds for every geometry; `0.0` and `-0.0` compare equal.
impl PartialEq for Coord {
    fn eq(&self, other: &Self) -> bool {
        same_f64(self.x, other.x) && same_f64(self.y, other.y)
    }
}

impl Eq for Coord {}

fn same_f64(a: f64, b: f64) -> bool {
    a == b || a.to_bits() == b.to_bits()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>) -> Self {
        Self { exterior, interiors: Vec::new() }
    }

    pub fn rings(&self) -> impl Iterator<Item = &Vec<Coord>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geometry {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point(Coord::new(x, y))
    }

    pub fn line(points: &[(f64, f64)]) -> Self {
        Self::LineString(points.iter().map(|&(x, y)| Coord::new(x, y)).collect())
    }

    pub fn polygon(exterior: &[(f64, f64)]) -> Self {
        Self::Polygon(Polygon::new(exterior.iter().map(|&(x, y)| Coord::new(x, y)).collect()))
    }

    /// Axis-aligned rectangle as a closed polygon ring.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::polygon(&[
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ])
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) | Self::MultiPoint(_) => GeometryKind::Point,
            Self::LineString(_) | Self::MultiLineString(_) => GeometryKind::Polyline,
            Self::Polygon(_) | Self::MultiPolygon(_) => GeometryKind::Polygon,
        }
    }

    /// Every vertex, in storage order.
    pub fn coords(&self) -> Box<dyn Iterator<Item = &Coord> + '_> {
        match self {
            Self::Point(c) => Box::new(std::iter::once(c)),
            Self::MultiPoint(cs) | Self::LineString(cs) => Box::new(cs.iter()),
            Self::MultiLineString(lines) => Box::new(lines.iter().flatten()),
            Self::Polygon(p) => Box::new(p.rings().flatten()),
            Self::MultiPolygon(ps) => Box::new(ps.iter().flat_map(|p| p.rings().flatten())),
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coords(self.coords())
    }

    /// Polygons of this geometry, empty for points and lines.
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Self::Polygon(p) => std::slice::from_ref(p),
            Self::MultiPolygon(ps) => ps,
            _ => &[],
        }
    }

    pub fn to_wkt(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Point(c) => {
                out.push_str("POINT (");
                push_coord(&mut out, c);
                out.push(')');
            }
            Self::MultiPoint(cs) => {
                out.push_str("MULTIPOINT ");
                push_seq(&mut out, cs.iter(), |o, c| {
                    o.push('(');
                    push_coord(o, c);
                    o.push(')');
                });
            }
            Self::LineString(cs) => {
                out.push_str("LINESTRING ");
                push_ring(&mut out, cs);
            }
            Self::MultiLineString(lines) => {
                out.push_str("MULTILINESTRING ");
                push_seq(&mut out, lines.iter(), |o, l| push_ring(o, l));
            }
            Self::Polygon(p) => {
                out.push_str("POLYGON ");
                push_polygon(&mut out, p);
            }
            Self::MultiPolygon(ps) => {
                out.push_str("MULTIPOLYGON ");
                push_seq(&mut out, ps.iter(), |o, p| push_polygon(o, p));
            }
        }
        out
    }

    /// Parse WKT. `Ok(None)` for `... EMPTY`.
    pub fn from_wkt(input: &str) -> Result<Option<Geometry>, String> {
        let mut parser = WktParser::new(input);
        let geometry = parser.geometry()?;
        parser.expect_end()?;
        Ok(geometry)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wkt())
    }
}

fn push_coord(out: &mut String, c: &Coord) {
    out.push_str(&format!("{} {}", c.x, c.y));
}

fn push_ring(out: &mut String, ring: &[Coord]) {
    push_seq(out, ring.iter(), |o, c| push_coord(o, c));
}

fn push_polygon(out: &mut String, p: &Polygon) {
    push_seq(out, p.rings(), |o, r| push_ring(o, r));
}

fn push_seq<'a, T: 'a>(
    out: &mut String,
    items: impl Iterator<Item = &'a T>,
    mut each: impl FnMut(&mut String, &T),
) {
    out.push('(');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        each(out, item);
    }
    out.push(')');
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box. `min` components never exceed `max` components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut b = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for c in iter {
            b.min_x = b.min_x.min(c.x);
            b.min_y = b.min_y.min(c.y);
            b.max_x = b.max_x.max(c.x);
            b.max_y = b.max_y.max(c.y);
        }
        Some(b)
    }

    /// Inclusive on edges, so touching boxes overlap.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    pub fn contains(&self, c: &Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }
}

// ---------------------------------------------------------------------------
// WKT parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(f64),
    Open,
    Close,
    Comma,
}

struct WktParser {
    tokens: Vec<Token>,
    pos: usize,
    error: Option<String>,
}

impl WktParser {
    fn new(input: &str) -> Self {
        let mut tokens = Vec::new();
        let mut error = None;
        let chars: Vec<char> = input.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c == '(' {
                tokens.push(Token::Open);
                i += 1;
            } else if c == ')' {
                tokens.push(Token::Close);
                i += 1;
            } else if c == ',' {
                tokens.push(Token::Comma);
                i += 1;
            } else if c.is_ascii_alphabetic() {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Word(word.to_ascii_uppercase()));
            } else if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || matches!(chars[i], '.' | 'e' | 'E')
                        || (matches!(chars[i], '-' | '+') && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                match text.parse::<f64>() {
                    Ok(n) => tokens.push(Token::Number(n)),
                    Err(_) => {
                        error = Some(format!("invalid number '{text}'"));
                        break;
                    }
                }
            } else {
                error = Some(format!("unexpected character '{c}'"));
                break;
            }
        }
        Self { tokens, pos: 0, error }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), String> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(format!("expected {want:?}, found {t:?}")),
            None => Err(format!("expected {want:?}, found end of input")),
        }
    }

    fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("trailing input at {t:?}")),
        }
    }

    fn geometry(&mut self) -> Result<Option<Geometry>, String> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let tag = match self.next() {
            Some(Token::Word(w)) => w,
            Some(t) => return Err(format!("expected geometry type, found {t:?}")),
            None => return Err("empty geometry text".into()),
        };
        // Dimension suffixes (Z, M, ZM) are accepted; extra ordinates are dropped.
        if let Some(Token::Word(w)) = self.peek() {
            if matches!(w.as_str(), "Z" | "M" | "ZM") {
                self.pos += 1;
            }
        }
        if let Some(Token::Word(w)) = self.peek() {
            if w == "EMPTY" {
                self.pos += 1;
                return Ok(None);
            }
        }
        let geometry = match tag.as_str() {
            "POINT" => {
                self.expect(Token::Open)?;
                let c = self.coord()?;
                self.expect(Token::Close)?;
                Geometry::Point(c)
            }
            "MULTIPOINT" => Geometry::MultiPoint(self.multipoint()?),
            "LINESTRING" => Geometry::LineString(self.coord_list()?),
            "MULTILINESTRING" => Geometry::MultiLineString(self.list(|p| p.coord_list())?),
            "POLYGON" => Geometry::Polygon(self.polygon()?),
            "MULTIPOLYGON" => Geometry::MultiPolygon(self.list(|p| p.polygon())?),
            other => return Err(format!("unsupported geometry type '{other}'")),
        };
        Ok(Some(geometry))
    }

    fn coord(&mut self) -> Result<Coord, String> {
        let x = self.number()?;
        let y = self.number()?;
        while let Some(Token::Number(_)) = self.peek() {
            self.pos += 1;
        }
        Ok(Coord::new(x, y))
    }

    fn number(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(t) => Err(format!("expected number, found {t:?}")),
            None => Err("expected number, found end of input".into()),
        }
    }

    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T, String>) -> Result<Vec<T>, String> {
        self.expect(Token::Open)?;
        let mut items = vec![item(self)?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            items.push(item(self)?);
        }
        self.expect(Token::Close)?;
        Ok(items)
    }

    fn coord_list(&mut self) -> Result<Vec<Coord>, String> {
        self.list(|p| p.coord())
    }

    fn multipoint(&mut self) -> Result<Vec<Coord>, String> {
        self.list(|p| {
            if p.peek() == Some(&Token::Open) {
                p.pos += 1;
                let c = p.coord()?;
                p.expect(Token::Close)?;
                Ok(c)
            } else {
                p.coord()
            }
        })
    }

    fn polygon(&mut self) -> Result<Polygon, String> {
        let mut rings = self.list(|p| p.coord_list())?;
        let exterior = rings.remove(0);
        Ok(Polygon { exterior, interiors: rings })
    }
}
