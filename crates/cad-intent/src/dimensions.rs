use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dimensions recovered from free text, in millimetres. Stored values are always
/// strictly positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDimensions {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
    pub diameter: Option<f64>,
    pub radius: Option<f64>,
    pub wall_thickness: Option<f64>,
}

impl ParsedDimensions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

const NUM: &str = r"([0-9]+(?:\.[0-9]+)?)";
const UNIT: &str = r"(?:mm|cm|毫米|厘米|m)?";
const SEP: &str = r"[x*×,]";
const LINK: &str = r"(?:(?:of|is)\b|[:=])?";
const CN_LINK: &str = r"[:：为是]?";

// English diameter words live in `DIAMETER_WORD` so they only match whole words.
const DIAMETER_SYMBOLS: &[&str] = &["直径", "半径", "φ", "ϕ", "⌀", "ø"];
const HOLLOW_KEYWORDS: &[&str] = &["hollow", "tube", "pipe", "sleeve", "空心", "圆筒", "管"];
const ROUND_KEYWORDS: &[&str] = &["cylinder", "tube", "pipe", "rod", "圆柱", "圆筒", "管"];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Invalid dimension regex")
}

static TRIPLE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{NUM}\s*{UNIT}\s*{SEP}\s*{NUM}\s*{UNIT}\s*{SEP}\s*{NUM}"
    ))
});
static PAIR: Lazy<Regex> = Lazy::new(|| compile(&format!(r"{NUM}\s*{UNIT}\s*{SEP}\s*{NUM}")));

static EN_WIDTH: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\bwidth\s*{LINK}\s*{NUM}")));
static EN_WIDE: Lazy<Regex> = Lazy::new(|| compile(&format!(r"{NUM}\s*{UNIT}\s*wide\b")));
static EN_HEIGHT: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\bheight\s*{LINK}\s*{NUM}")));
static EN_TALL: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"{NUM}\s*{UNIT}\s*(?:high|tall)\b")));
static EN_DEPTH: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\bdepth\s*{LINK}\s*{NUM}")));
static DIAMETER_WORD: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(?:diameter|diam|dia|radius|phi)(?:\b|[0-9])"));
static EN_DIAMETER: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"\b(?:diameter|diam|dia)\s*{LINK}\s*{NUM}")));
static EN_RADIUS: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\bradius\s*{LINK}\s*{NUM}")));
static EN_WALL: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"\bwall\s*thickness\s*{LINK}\s*{NUM}")));
static EN_WALLS: Lazy<Regex> = Lazy::new(|| compile(&format!(r"{NUM}\s*{UNIT}\s*walls?\b")));
static EN_SIDE: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"\bside\s*(?:length)?\s*{LINK}\s*{NUM}")));
static EN_CUBE: Lazy<Regex> = Lazy::new(|| compile(&format!(r"{NUM}\s*{UNIT}\s*cube\b")));

static CN_WIDTH: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"(?:宽度|宽|长度|长)\s*{CN_LINK}\s*{NUM}")));
static CN_HEIGHT: Lazy<Regex> = Lazy::new(|| compile(&format!(r"(?:高度|高)\s*{CN_LINK}\s*{NUM}")));
// Group 1 marks a 壁厚 (wall thickness) hit, which is not a depth.
static CN_DEPTH: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"(壁)?(?:深度|深|厚度|厚)\s*{CN_LINK}\s*{NUM}")));
static CN_DIAMETER: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"(?:直径|φ|phi|ϕ|⌀|ø)\s*{CN_LINK}\s*{NUM}")));
static CN_RADIUS: Lazy<Regex> = Lazy::new(|| compile(&format!(r"半径\s*{CN_LINK}\s*{NUM}")));
static CN_WALL: Lazy<Regex> = Lazy::new(|| compile(&format!(r"壁厚\s*{CN_LINK}\s*{NUM}")));
static CN_SIDE: Lazy<Regex> = Lazy::new(|| compile(&format!(r"边长\s*{CN_LINK}\s*{NUM}")));

static BY_TRIPLE: Lazy<Regex> = Lazy::new(|| {
    let by = r"(?:\bby\b|乘|\*)";
    compile(&format!(
        r"{NUM}\s*{UNIT}\s*{by}\s*{NUM}\s*{UNIT}\s*{by}\s*{NUM}"
    ))
});
static DIAMETER_AFTER: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{NUM}\s*{UNIT}\s*(?:diameter|diam|dia|直径|φ|phi|ϕ|⌀|ø)"
    ))
});
static DIAMETER_BEFORE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?:diameter|diam|dia|直径|φ|phi|ϕ|⌀|ø)\s*[:：=]?\s*{NUM}"
    ))
});

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn number(captures: &regex::Captures<'_>, group: usize) -> Option<f64> {
    captures.get(group)?.as_str().parse::<f64>().ok()
}

fn first_number(pattern: &Regex, text: &str) -> Option<f64> {
    pattern.captures(text).and_then(|c| number(&c, 1))
}

/// Writes `value` into an empty slot; zero or negative values count as absent.
fn fill(slot: &mut Option<f64>, value: Option<f64>) {
    if slot.is_none()
        && let Some(value) = value
        && value.is_finite()
        && value > 0.0
    {
        *slot = Some(value);
    }
}

/// Extracts dimensions from English, Chinese or mixed text.
///
/// Stages run in a fixed order and only ever fill fields that are still absent. A
/// positional `AxBxC` group wins outright and skips every later stage.
pub fn extract_dimensions(text: &str) -> ParsedDimensions {
    let text = text.to_lowercase();
    let mut dims = ParsedDimensions::default();

    if positional_group(&text, &mut dims) {
        debug!(?dims, "positional group matched");
        return dims;
    }

    english_labels(&text, &mut dims);
    chinese_labels(&text, &mut dims);

    if dims.is_empty()
        && let Some(c) = BY_TRIPLE.captures(&text)
    {
        debug!("'by' triple matched");
        fill(&mut dims.width, number(&c, 1));
        fill(&mut dims.depth, number(&c, 2));
        fill(&mut dims.height, number(&c, 3));
    }

    if dims.diameter.is_none() {
        let value = first_number(&DIAMETER_AFTER, &text)
            .or_else(|| first_number(&DIAMETER_BEFORE, &text));
        fill(&mut dims.diameter, value);
    }

    if dims.is_empty()
        && let Some(c) = PAIR.captures(&text)
    {
        if contains_any(&text, ROUND_KEYWORDS) {
            debug!("pair matched as diameter x height");
            fill(&mut dims.diameter, number(&c, 1));
        } else {
            debug!("pair matched as width x height");
            fill(&mut dims.width, number(&c, 1));
        }
        fill(&mut dims.height, number(&c, 2));
    }

    debug!(?dims, "dimensions extracted");
    dims
}

fn positional_group(text: &str, dims: &mut ParsedDimensions) -> bool {
    if DIAMETER_WORD.is_match(text) || contains_any(text, DIAMETER_SYMBOLS) {
        let Some((diameter, height, third)) = TRIPLE
            .captures(text)
            .map(|c| (number(&c, 1), number(&c, 2), number(&c, 3)))
            .or_else(|| {
                PAIR.captures(text)
                    .map(|c| (number(&c, 1), number(&c, 2), None))
            })
        else {
            return false;
        };
        fill(&mut dims.diameter, diameter);
        fill(&mut dims.height, height);
        if contains_any(text, HOLLOW_KEYWORDS) {
            fill(&mut dims.wall_thickness, third);
        }
        return true;
    }

    let Some(c) = TRIPLE.captures(text) else {
        return false;
    };
    fill(&mut dims.width, number(&c, 1));
    fill(&mut dims.depth, number(&c, 2));
    fill(&mut dims.height, number(&c, 3));
    true
}

fn english_labels(text: &str, dims: &mut ParsedDimensions) {
    fill(&mut dims.width, first_number(&EN_WIDTH, text));
    fill(&mut dims.width, first_number(&EN_WIDE, text));
    fill(&mut dims.height, first_number(&EN_HEIGHT, text));
    fill(&mut dims.height, first_number(&EN_TALL, text));
    fill(&mut dims.depth, first_number(&EN_DEPTH, text));
    fill(&mut dims.diameter, first_number(&EN_DIAMETER, text));
    fill(&mut dims.radius, first_number(&EN_RADIUS, text));
    fill(&mut dims.wall_thickness, first_number(&EN_WALL, text));
    fill(&mut dims.wall_thickness, first_number(&EN_WALLS, text));

    let side = first_number(&EN_SIDE, text).or_else(|| first_number(&EN_CUBE, text));
    fill(&mut dims.width, side);
    fill(&mut dims.depth, side);
    fill(&mut dims.height, side);
}

fn chinese_labels(text: &str, dims: &mut ParsedDimensions) {
    fill(&mut dims.width, first_number(&CN_WIDTH, text));
    fill(&mut dims.height, first_number(&CN_HEIGHT, text));
    let depth = CN_DEPTH
        .captures_iter(text)
        .find(|c| c.get(1).is_none())
        .and_then(|c| number(&c, 2));
    fill(&mut dims.depth, depth);
    fill(&mut dims.diameter, first_number(&CN_DIAMETER, text));
    fill(&mut dims.radius, first_number(&CN_RADIUS, text));
    fill(&mut dims.wall_thickness, first_number(&CN_WALL, text));

    let side = first_number(&CN_SIDE, text);
    fill(&mut dims.width, side);
    fill(&mut dims.depth, side);
    fill(&mut dims.height, side);
}
