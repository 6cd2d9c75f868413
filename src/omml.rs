//! Office Math Markup (OMML) to inline LaTeX.
//!
//! A math block is first lowered into a typed [`MathNode`] tree, then
//! rendered recursively. The supported subset is:
//!
//! | OMML | Node | LaTeX |
//! |------|------|-------|
//! | `m:r` | `Text` | the run text |
//! | `m:f` | `Fraction` | `\frac{num}{den}` |
//! | `m:sSup`, `m:sSub`, `m:sSubSup` | `SupSub` | `base_{sub}^{sup}` |
//! | `m:rad` | `Radical` | `\sqrt{e}` or `\sqrt[deg]{e}` |
//! | `m:nary` | `NAry` | `\sum_{sub}^{sup}(body)` |
//! | `m:d` | `Delimiter` | `(a|b)` with the declared characters |
//! | `m:func` | `Function` | `\sin x` |
//! | `m:box`, `m:borderBox`, `m:phant` | transparent | inner expression |
//!
//! Anything else becomes [`MathNode::Placeholder`], rendered as `/*math*/`,
//! so an unknown construct never aborts the surrounding document.

use crate::xml::{Ns, XmlElement, XmlNode};

/// Rendered in place of a construct outside the supported subset.
pub const MATH_PLACEHOLDER: &str = "/*math*/";

#[derive(Debug, Clone, PartialEq)]
pub enum MathNode {
    PlainText(String),
    Row(Vec<MathNode>),
    Fraction {
        num: Box<MathNode>,
        den: Box<MathNode>,
    },
    SupSub {
        base: Box<MathNode>,
        sup: Option<Box<MathNode>>,
        sub: Option<Box<MathNode>>,
    },
    Radical {
        degree: Option<Box<MathNode>>,
        body: Box<MathNode>,
    },
    NAry {
        operator: String,
        sub: Option<Box<MathNode>>,
        sup: Option<Box<MathNode>>,
        body: Box<MathNode>,
    },
    Delimiter {
        open: String,
        close: String,
        separator: String,
        items: Vec<MathNode>,
    },
    Function {
        name: Box<MathNode>,
        arg: Box<MathNode>,
    },
    Placeholder,
}

impl MathNode {
    fn is_empty(&self) -> bool {
        match self {
            MathNode::PlainText(t) => t.trim().is_empty(),
            MathNode::Row(items) => items.iter().all(MathNode::is_empty),
            _ => false,
        }
    }
}

/// Lower an `m:oMath` or `m:oMathPara` element.
pub fn parse_math(el: &XmlElement) -> MathNode {
    parse_row(el)
}

/// Render a math element as `$ latex $`.
pub fn math_to_inline(el: &XmlElement) -> String {
    let node = parse_math(el);
    let latex = if node.is_empty() {
        MATH_PLACEHOLDER.to_string()
    } else {
        to_latex(&node)
    };
    format!("$ {} $", latex.trim())
}

fn parse_row(el: &XmlElement) -> MathNode {
    let mut items = Vec::new();
    for child in &el.children {
        match child {
            XmlNode::Element(e) => {
                if let Some(node) = parse_node(e) {
                    items.push(node);
                }
            }
            XmlNode::Text(_) => {}
        }
    }
    if items.len() == 1 {
        items.remove(0)
    } else {
        MathNode::Row(items)
    }
}

fn parse_node(el: &XmlElement) -> Option<MathNode> {
    if el.ns != Ns::Math {
        // Word run properties and bookmarks interleave with math content.
        return None;
    }
    if el.name.ends_with("Pr") {
        return None;
    }
    let node = match el.name.as_str() {
        "r" => MathNode::PlainText(run_text(el)),
        "oMath" | "oMathPara" | "e" => parse_row(el),
        "f" => MathNode::Fraction {
            num: Box::new(arg(el, "num")),
            den: Box::new(arg(el, "den")),
        },
        "sSup" | "sSub" | "sSubSup" => MathNode::SupSub {
            base: Box::new(arg(el, "e")),
            sup: optional_arg(el, "sup"),
            sub: optional_arg(el, "sub"),
        },
        "rad" => MathNode::Radical {
            degree: optional_arg(el, "deg"),
            body: Box::new(arg(el, "e")),
        },
        "nary" => MathNode::NAry {
            operator: property(el, "naryPr", "chr").unwrap_or_else(|| "∑".to_string()),
            sub: optional_arg(el, "sub"),
            sup: optional_arg(el, "sup"),
            body: Box::new(arg(el, "e")),
        },
        "d" => MathNode::Delimiter {
            open: property(el, "dPr", "begChr").unwrap_or_else(|| "(".to_string()),
            close: property(el, "dPr", "endChr").unwrap_or_else(|| ")".to_string()),
            separator: property(el, "dPr", "sepChr").unwrap_or_else(|| "|".to_string()),
            items: el
                .elements()
                .filter(|c| c.is(Ns::Math, "e"))
                .map(parse_row)
                .collect(),
        },
        "func" => MathNode::Function {
            name: Box::new(arg(el, "fName")),
            arg: Box::new(arg(el, "e")),
        },
        "box" | "borderBox" | "phant" => arg(el, "e"),
        _ => MathNode::Placeholder,
    };
    Some(node)
}

fn run_text(el: &XmlElement) -> String {
    el.elements()
        .filter(|c| c.is(Ns::Math, "t"))
        .map(XmlElement::text)
        .collect()
}

fn arg(el: &XmlElement, name: &str) -> MathNode {
    el.child(Ns::Math, name)
        .map(parse_row)
        .unwrap_or(MathNode::Row(Vec::new()))
}

fn optional_arg(el: &XmlElement, name: &str) -> Option<Box<MathNode>> {
    let node = arg(el, name);
    if node.is_empty() {
        None
    } else {
        Some(Box::new(node))
    }
}

/// Reads `<m:{props}><m:{key} m:val="…"/></m:{props}>`.
fn property(el: &XmlElement, props: &str, key: &str) -> Option<String> {
    el.child(Ns::Math, props)?
        .child(Ns::Math, key)?
        .attr("val")
        .map(str::to_string)
}

fn nary_operator(symbol: &str) -> &str {
    match symbol {
        "∑" => "\\sum",
        "∫" => "\\int",
        "∏" => "\\prod",
        other => other,
    }
}

const KNOWN_FUNCTIONS: [&str; 12] = [
    "sin", "cos", "tan", "cot", "sec", "csc", "log", "ln", "exp", "lim", "max", "min",
];

pub fn to_latex(node: &MathNode) -> String {
    match node {
        MathNode::PlainText(t) => t.clone(),
        MathNode::Row(items) => items.iter().map(to_latex).collect(),
        MathNode::Fraction { num, den } => {
            format!("\\frac{{{}}}{{{}}}", to_latex(num), to_latex(den))
        }
        MathNode::SupSub { base, sup, sub } => {
            let mut out = to_latex(base);
            if let Some(sub) = sub {
                out.push_str(&format!("_{{{}}}", to_latex(sub)));
            }
            if let Some(sup) = sup {
                out.push_str(&format!("^{{{}}}", to_latex(sup)));
            }
            out
        }
        MathNode::Radical { degree, body } => match degree {
            Some(deg) => format!("\\sqrt[{}]{{{}}}", to_latex(deg), to_latex(body)),
            None => format!("\\sqrt{{{}}}", to_latex(body)),
        },
        MathNode::NAry {
            operator,
            sub,
            sup,
            body,
        } => {
            let mut out = nary_operator(operator).to_string();
            if let Some(sub) = sub {
                out.push_str(&format!("_{{{}}}", to_latex(sub)));
            }
            if let Some(sup) = sup {
                out.push_str(&format!("^{{{}}}", to_latex(sup)));
            }
            out.push_str(&format!("({})", to_latex(body)));
            out
        }
        MathNode::Delimiter {
            open,
            close,
            separator,
            items,
        } => {
            let inner: Vec<String> = items.iter().map(to_latex).collect();
            format!("{}{}{}", open, inner.join(separator), close)
        }
        MathNode::Function { name, arg } => {
            let name = to_latex(name);
            let trimmed = name.trim();
            if KNOWN_FUNCTIONS.contains(&trimmed) {
                format!("\\{} {}", trimmed, to_latex(arg))
            } else {
                format!("{} {}", trimmed, to_latex(arg))
            }
        }
        MathNode::Placeholder => MATH_PLACEHOLDER.to_string(),
    }
}
