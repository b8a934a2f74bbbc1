// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//


//! The tree produced by the grammar engine. Interior nodes are reductions, leaves are the
//! scanner's tokens; children always appear in token (and therefore offset) order.

use arcstr::ArcStr;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::Arc;

use crate::token::Token;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Token {
        index: usize,
        token: Token,
    },
    Tree {
        tag: ArcStr,
        /// Half-open range of token indices covered by this reduction.
        start: usize,
        end: usize,
        children: Vec<Arc<Node>>,
    },
}

impl Node {
    pub fn leaf(index: usize, token: Token) -> Self {
        Node::Token { index, token }
    }

    pub fn tree(tag: ArcStr, span: Range<usize>, children: Vec<Arc<Node>>) -> Self {
        Node::Tree {
            tag,
            start: span.start,
            end: span.end,
            children,
        }
    }

    /// Nonterminal name, or the token kind for a leaf.
    pub fn tag(&self) -> &str {
        match self {
            Node::Token { token, .. } => token.kind.as_str(),
            Node::Tree { tag, .. } => tag.as_str(),
        }
    }

    pub fn span(&self) -> Range<usize> {
        match self {
            Node::Token { index, .. } => *index..*index + 1,
            Node::Tree { start, end, .. } => *start..*end,
        }
    }

    pub fn children(&self) -> &[Arc<Node>] {
        match self {
            Node::Token { .. } => &[],
            Node::Tree { children, .. } => children,
        }
    }

    pub fn child(&self, i: usize) -> Option<&Node> {
        self.children().get(i).map(|c| c.as_ref())
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            Node::Token { token, .. } => Some(token),
            Node::Tree { .. } => None,
        }
    }

    /// Every token under this node, in order.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = vec![];
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
        match self {
            Node::Token { token, .. } => out.push(token),
            Node::Tree { children, .. } => {
                for c in children {
                    c.collect_tokens(out);
                }
            }
        }
    }

    /// Pre-order search for nodes tagged `tag`.
    pub fn find_all<'a>(&'a self, tag: &str) -> Vec<&'a Node> {
        let mut out = vec![];
        self.walk(&mut |n| {
            if n.tag() == tag {
                out.push(n);
            }
        });
        out
    }

    pub fn find(&self, tag: &str) -> Option<&Node> {
        self.find_all(tag).into_iter().next()
    }

    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for c in self.children() {
            c.walk(f);
        }
    }

    fn render(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        let indent = depth * 2;
        match self {
            Node::Token { token, .. } => {
                write!(f, "{:indent$}{}", "", token.kind)?;
                if token.attr != crate::token::Attr::None {
                    write!(f, " {}", token.attr)?;
                }
                writeln!(f, " @{}", token.offset)
            }
            Node::Tree { tag, children, .. } => {
                writeln!(f, "{:indent$}{tag}", "")?;
                for c in children {
                    c.render(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.render(f, 0)
    }
}

/// The reconstructed tree of one code unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ast {
    pub root: Arc<Node>,
}

impl Ast {
    pub fn new(root: Arc<Node>) -> Self {
        Self { root }
    }

    pub fn find_all(&self, tag: &str) -> Vec<&Node> {
        self.root.find_all(tag)
    }

    pub fn find(&self, tag: &str) -> Option<&Node> {
        self.root.find(tag)
    }
}

impl Display for Ast {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.root, f)
    }
}
