//! Node types known to the in-memory host

use crate::attribute::{AttrKind, AttrSpec, DataType, NumericType, RawValue, IDENTITY_MATRIX};
use crate::host::Capability;

pub(crate) struct NodeType {
    pub capabilities: Vec<Capability>,
    pub attrs: Vec<AttrSpec>,
}

const ROTATE_ORDERS: &[(&str, i64)] = &[
    ("xyz", 0),
    ("yzx", 1),
    ("zxy", 2),
    ("xzy", 3),
    ("yxz", 4),
    ("zyx", 5),
];

/// Every type name `builtin` accepts
pub const NODE_TYPES: &[&str] = &[
    "transform",
    "joint",
    "locator",
    "network",
    "objectSet",
    "multDoubleLinear",
    "plusMinusAverage",
    "choice",
    "time",
    "animCurveTL",
    "animCurveTA",
    "animCurveTU",
    "animCurveTT",
];

pub(crate) fn builtin(type_name: &str) -> Option<NodeType> {
    let (capabilities, extra) = match type_name {
        "transform" => (vec![Capability::Dag, Capability::Transform], transform_attrs()),
        "joint" => {
            let mut attrs = transform_attrs();
            attrs.push(triple("jointOrient", "jo", AttrKind::Angle, &["jox", "joy", "joz"]));
            attrs.push(AttrSpec::double("radius").short("radi").default(RawValue::Double(1.0)));
            (vec![Capability::Dag, Capability::Transform], attrs)
        }
        "locator" => (
            vec![Capability::Dag, Capability::Shape],
            vec![
                triple("localPosition", "lp", AttrKind::Distance, &["lpx", "lpy", "lpz"]),
                ones(triple("localScale", "los", AttrKind::Numeric(NumericType::Double), &["lsx", "lsy", "lsz"])),
                triple("worldPosition", "wp", AttrKind::Distance, &["wpx", "wpy", "wpz"]).array(),
            ],
        ),
        "network" => (Vec::new(), Vec::new()),
        "objectSet" => (
            vec![Capability::Set],
            vec![AttrSpec::string("annotation").short("an")],
        ),
        "multDoubleLinear" => (
            Vec::new(),
            vec![
                AttrSpec::double("input1").short("i1").keyable(true),
                AttrSpec::double("input2").short("i2").keyable(true).default(RawValue::Double(1.0)),
                AttrSpec::double("output").short("o"),
            ],
        ),
        "plusMinusAverage" => (
            Vec::new(),
            vec![
                AttrSpec::enumeration("operation", &[("noOperation", 0), ("sum", 1), ("subtract", 2), ("average", 3)])
                    .short("op")
                    .default(RawValue::Int(1)),
                AttrSpec::double("input1D").short("i1").array(),
                triple("input3D", "i3", AttrKind::Numeric(NumericType::Double), &["i3x", "i3y", "i3z"]).array(),
                AttrSpec::double("output1D").short("o1"),
            ],
        ),
        "choice" => (
            Vec::new(),
            vec![
                AttrSpec::long("selector").short("s"),
                AttrSpec::new("input", AttrKind::Generic).short("i").array(),
                AttrSpec::new("output", AttrKind::Generic).short("o"),
            ],
        ),
        "time" => (Vec::new(), vec![AttrSpec::time("outTime").short("o")]),
        "animCurveTL" => anim_curve(AttrKind::Distance),
        "animCurveTA" => anim_curve(AttrKind::Angle),
        "animCurveTU" => anim_curve(AttrKind::Numeric(NumericType::Double)),
        "animCurveTT" => anim_curve(AttrKind::Time),
        _ => return None,
    };

    let mut attrs = base_attrs();
    attrs.extend(extra);
    Some(NodeType { capabilities, attrs })
}

fn base_attrs() -> Vec<AttrSpec> {
    vec![
        AttrSpec::message("message").short("msg"),
        AttrSpec::boolean("caching").short("cch"),
        AttrSpec::new("isHistoricallyInteresting", AttrKind::Numeric(NumericType::Byte))
            .short("ihi")
            .default(RawValue::Int(2)),
        AttrSpec::enumeration(
            "nodeState",
            &[("normal", 0), ("hasNoEffect", 1), ("blocking", 2), ("waiting", 8)],
        )
        .short("nds"),
    ]
}

fn transform_attrs() -> Vec<AttrSpec> {
    vec![
        AttrSpec::boolean("visibility")
            .short("v")
            .keyable(true)
            .default(RawValue::Bool(true)),
        triple("translate", "t", AttrKind::Distance, &["tx", "ty", "tz"]),
        triple("rotate", "r", AttrKind::Angle, &["rx", "ry", "rz"]),
        ones(triple("scale", "s", AttrKind::Numeric(NumericType::Double), &["sx", "sy", "sz"])),
        AttrSpec::enumeration("rotateOrder", ROTATE_ORDERS).short("ro"),
        AttrSpec::matrix("offsetParentMatrix").short("opm"),
        AttrSpec::new("worldMatrix", AttrKind::Typed(DataType::Matrix))
            .short("wm")
            .default(RawValue::Matrix(IDENTITY_MATRIX))
            .array(),
    ]
}

fn anim_curve(output: AttrKind) -> (Vec<Capability>, Vec<AttrSpec>) {
    (
        vec![Capability::AnimCurve],
        vec![
            AttrSpec::time("input").short("i"),
            AttrSpec::new("output", output).short("o"),
        ],
    )
}

fn triple(name: &str, short: &str, kind: AttrKind, children: &[&str]) -> AttrSpec {
    let mut spec = AttrSpec::triple(name, kind).short(short).child_short_names(children);
    for child in &mut spec.children {
        child.keyable = true;
    }
    spec.keyable = true;
    spec
}

fn ones(mut spec: AttrSpec) -> AttrSpec {
    for child in &mut spec.children {
        child.default = RawValue::Double(1.0);
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_type_resolves() {
        for name in NODE_TYPES {
            let node_type = builtin(name).unwrap_or_else(|| panic!("{name} missing"));
            assert_eq!(node_type.attrs[0].name, "message");
        }
        assert!(builtin("notAType").is_none());
    }

    #[test]
    fn test_transform_layout() {
        let node_type = builtin("transform").unwrap();
        assert!(node_type.capabilities.contains(&Capability::Dag));
        let scale = node_type.attrs.iter().find(|a| a.name == "scale").unwrap();
        assert!(scale.children.iter().all(|c| c.default == RawValue::Double(1.0)));
    }
}
