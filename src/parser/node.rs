use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Original,
    Binary,
    Cmd,
    ReadCmd,
    WriteCmd,
    Filter,
    Modification,
    Attribute,
    AttMod,
    Uda,
    Op,
    Literal,
    Regex,
    Tag,
    Pseudo,
    Terminator,
    Terminated,
    Word,
    Quoted,
    Assumed,
    Default,
    Alias,
    Lex,
    Substitution,
    Modifiable,
    Id,
    Uuid,
    Rc,
    Config,
    Number,
    String,
}

impl Tag {
    pub const ALL: [Tag; 31] = [
        Tag::Original,
        Tag::Binary,
        Tag::Cmd,
        Tag::ReadCmd,
        Tag::WriteCmd,
        Tag::Filter,
        Tag::Modification,
        Tag::Attribute,
        Tag::AttMod,
        Tag::Uda,
        Tag::Op,
        Tag::Literal,
        Tag::Regex,
        Tag::Tag,
        Tag::Pseudo,
        Tag::Terminator,
        Tag::Terminated,
        Tag::Word,
        Tag::Quoted,
        Tag::Assumed,
        Tag::Default,
        Tag::Alias,
        Tag::Lex,
        Tag::Substitution,
        Tag::Modifiable,
        Tag::Id,
        Tag::Uuid,
        Tag::Rc,
        Tag::Config,
        Tag::Number,
        Tag::String,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Original => "ORIGINAL",
            Tag::Binary => "BINARY",
            Tag::Cmd => "CMD",
            Tag::ReadCmd => "READCMD",
            Tag::WriteCmd => "WRITECMD",
            Tag::Filter => "FILTER",
            Tag::Modification => "MODIFICATION",
            Tag::Attribute => "ATTRIBUTE",
            Tag::AttMod => "ATTMOD",
            Tag::Uda => "UDA",
            Tag::Op => "OP",
            Tag::Literal => "LITERAL",
            Tag::Regex => "REGEX",
            Tag::Tag => "TAG",
            Tag::Pseudo => "PSEUDO",
            Tag::Terminator => "TERMINATOR",
            Tag::Terminated => "TERMINATED",
            Tag::Word => "WORD",
            Tag::Quoted => "QUOTED",
            Tag::Assumed => "ASSUMED",
            Tag::Default => "DEFAULT",
            Tag::Alias => "ALIAS",
            Tag::Lex => "LEX",
            Tag::Substitution => "SUBSTITUTION",
            Tag::Modifiable => "MODIFIABLE",
            Tag::Id => "ID",
            Tag::Uuid => "UUID",
            Tag::Rc => "RC",
            Tag::Config => "CONFIG",
            Tag::Number => "NUMBER",
            Tag::String => "STRING",
        }
    }

    fn bit(self) -> u64 {
        1u64 << (self as u32)
    }
}

/// Fixed-width set of [`Tag`]s. Iteration follows declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TagSet(u64);

impl TagSet {
    pub fn of(tags: &[Tag]) -> Self {
        let mut set = TagSet::default();
        for tag in tags {
            set.insert(*tag);
        }
        set
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0 |= tag.bit();
    }

    pub fn remove(&mut self, tag: Tag) {
        self.0 &= !tag.bit();
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Tag> + '_ {
        Tag::ALL.into_iter().filter(|tag| self.contains(*tag))
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.iter().map(Tag::as_str).collect::<Vec<_>>();
        f.write_str(&names.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Positive,
    Negative,
}

impl Sense {
    pub fn as_str(self) -> &'static str {
        match self {
            Sense::Positive => "+",
            Sense::Negative => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
    pub global: bool,
}

/// One argument node. Classification lives in `tags`; the optional fields hold
/// whatever a pass extracted from `raw`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub raw: String,
    pub tags: TagSet,
    pub canonical: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub modifier: Option<String>,
    pub sense: Option<Sense>,
    pub substitution: Option<Substitution>,
    pub sign: Option<char>,
    pub file: Option<String>,
    pub basename: Option<String>,
}

impl Node {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::default()
        }
    }

    pub fn tagged(raw: impl Into<String>, tags: &[Tag]) -> Self {
        Self {
            raw: raw.into(),
            tags: TagSet::of(tags),
            ..Self::default()
        }
    }

    pub fn has(&self, tag: Tag) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_any(&self, tags: &[Tag]) -> bool {
        tags.iter().any(|tag| self.has(*tag))
    }

    pub fn tag(&mut self, tag: Tag) {
        self.tags.insert(tag);
    }

    pub fn untag(&mut self, tag: Tag) {
        self.tags.remove(tag);
    }

    /// Text contributed to a composed filter: the canonical `name` when set.
    pub fn filter_text(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.raw)
    }

    fn attribute_summary(&self) -> String {
        let mut parts = Vec::new();
        let fields = [
            ("canonical", &self.canonical),
            ("name", &self.name),
            ("value", &self.value),
            ("modifier", &self.modifier),
            ("file", &self.file),
            ("basename", &self.basename),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                parts.push(format!("{key}={value}"));
            }
        }
        if let Some(sense) = self.sense {
            parts.push(format!("sense={}", sense.as_str()));
        }
        if let Some(sign) = self.sign {
            parts.push(format!("sign={sign}"));
        }
        if let Some(sub) = &self.substitution {
            parts.push(format!(
                "from={} to={} global={}",
                sub.from,
                sub.to,
                u8::from(sub.global)
            ));
        }
        parts.join(" ")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.raw, self.tags)?;
        let attrs = self.attribute_summary();
        if !attrs.is_empty() {
            write!(f, " {{{attrs}}}")?;
        }
        Ok(())
    }
}

pub fn dump(nodes: &[Node], title: &str) -> String {
    let mut out = format!("{title}\n");
    for node in nodes {
        out.push_str("  ");
        out.push_str(&node.to_string());
        out.push('\n');
    }
    out
}
