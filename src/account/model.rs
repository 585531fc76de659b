//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::str::FromStr;

use bitflags::bitflags;
use chrono::prelude::*;
use rand::Rng;

use crate::support::error::Error;

/// The gateway's own identifier for a message.
///
/// This is stable for the life of the message even if the remote store
/// re-creates it under a new remote id. It is also what gets written into the
/// internal-id header of literals handed to the remote store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u128);

impl MessageId {
    pub fn generate() -> Self {
        MessageId(rand::thread_rng().gen())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MessageId({})", self)
    }
}

impl FromStr for MessageId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        if 32 != s.len() {
            return Err(());
        }

        u128::from_str_radix(s, 16).map(MessageId).map_err(|_| ())
    }
}

/// The gateway's own identifier for a mailbox within one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxId(pub u64);

/// Identifies one selected-mailbox snapshot across the whole process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(pub u64);

/// The remote store's identifier for a message.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteMessageId(pub String);

/// The remote store's identifier for a mailbox (a "label").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteMailboxId(pub String);

impl fmt::Display for RemoteMessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RemoteMailboxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are added to the
/// mailbox. UIDs are never reused within one `UIDVALIDITY` epoch.
///
/// In this implementation, UIDs are assigned strictly sequentially.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Uid {
    fn default() -> Self {
        Uid::MIN
    }
}

impl Uid {
    pub const MIN: Self = match NonZeroU32::new(1) {
        Some(v) => Uid(v),
        None => unreachable!(),
    };
    pub const MAX: Self = match NonZeroU32::new(u32::MAX) {
        Some(v) => Uid(v),
        None => unreachable!(),
    };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn next(self) -> Option<Self> {
        self.0.get().checked_add(1).and_then(Uid::of)
    }

    pub fn saturating_next(self) -> Self {
        self.next().unwrap_or(Uid::MAX)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl TryFrom<u32> for Uid {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Uid> for u32 {
    fn from(uid: Uid) -> u32 {
        uid.0.get()
    }
}

/// The position of a message within one snapshot, counting from 1.
///
/// Unlike UIDs, sequence numbers shift whenever a snapshot learns of an
/// expunge, and two snapshots of the same mailbox may disagree about them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seqnum(pub NonZeroU32);

impl Default for Seqnum {
    fn default() -> Self {
        Seqnum::MIN
    }
}

impl Seqnum {
    pub const MIN: Self = match NonZeroU32::new(1) {
        Some(v) => Seqnum(v),
        None => unreachable!(),
    };

    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }

    pub fn to_index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Convert a 0-based index into a sequence number.
    ///
    /// Snapshots never hold more than `u32::MAX` messages, so this saturates
    /// rather than failing.
    pub fn from_index(ix: usize) -> Self {
        u32::try_from(ix + 1)
            .ok()
            .and_then(Seqnum::of)
            .unwrap_or(Seqnum(NonZeroU32::MAX))
    }
}

impl TryFrom<u32> for Seqnum {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Seqnum> for u32 {
    fn from(seqnum: Seqnum) -> u32 {
        seqnum.0.get()
    }
}

impl fmt::Debug for Seqnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Seqnum({})", self.0.get())
    }
}

/// A "sequence set range" of sequence numbers or UIDs.
///
/// Internally, this is maintained as a minimal sorted set of inclusive ranges.
/// It does not maintain information on the original fragmentation, ordering,
/// or duplication.
///
/// The `Display` format puts this into minimal IMAP wire format. Note that
/// IMAP does not have a way to represent an empty sequence set. `Display`
/// produces an empty string in that case, which is invalid.
#[derive(Clone, PartialEq, Eq)]
pub struct SeqRange<T> {
    parts: BTreeMap<u32, u32>,
    _t: PhantomData<T>,
}

impl<T> SeqRange<T> {
    /// Create a new, empty range.
    pub fn new() -> Self {
        SeqRange {
            parts: BTreeMap::new(),
            _t: PhantomData,
        }
    }

    /// Return whether this range is empty (invalid for IMAP wire format).
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl<T: TryFrom<u32> + Into<u32> + PartialOrd> SeqRange<T> {
    /// Create a range containing just the given item.
    pub fn just(item: T) -> Self {
        let mut this = SeqRange::new();
        this.append(item);
        this
    }

    /// Create a range containing just a single, simple range.
    pub fn range(start: T, end: T) -> Self {
        let mut this = SeqRange::new();
        this.insert(start, end);
        this
    }

    /// Append a single item to this range.
    ///
    /// If the item is not strictly greater than everything already present,
    /// this degrades to a general insertion.
    pub fn append(&mut self, item: T) {
        let item: u32 = item.into();

        if let Some(end) = self.parts.values_mut().next_back() {
            if item == end.saturating_add(1) {
                *end = item;
                return;
            }

            if item <= *end {
                self.insert_raw(item, item);
                return;
            }
        }

        self.parts.insert(item, item);
    }

    /// Insert the given inclusive range into this sequence set.
    ///
    /// The endpoints may be given in either order.
    pub fn insert(&mut self, start_incl: T, end_incl: T) {
        let (a, b): (u32, u32) = (start_incl.into(), end_incl.into());
        self.insert_raw(a.min(b), a.max(b));
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // If this range overlaps or abuts any later ranges, fuse them.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            if let Some((following_start, following_end)) = following {
                if following_start - 1 <= end_incl {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                    continue;
                }
            }

            break;
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        self.parts.insert(start_incl, end_incl);
    }

    /// Return whether the given item is present in this set.
    pub fn contains(&self, v: T) -> bool {
        let v: u32 = v.into();
        self.parts
            .range(..=v)
            .next_back()
            .filter(|&(_, &end)| end >= v)
            .is_some()
    }

    /// Return an iterator to the items in this set.
    ///
    /// Invalid items and items greater than `max` are silently excluded.
    ///
    /// Items are delivered in strictly ascending order.
    pub fn items(&self, max: u32) -> impl Iterator<Item = T> + '_ {
        self.parts
            .iter()
            .map(|(&start, &end)| (start, end))
            .filter(move |&(start, _)| start <= max)
            .flat_map(move |(start, end)| start..=end.min(max))
            .filter_map(|v| T::try_from(v).ok())
    }

    /// Parse the IMAP-format of the sequence set.
    ///
    /// `splat` is used as the value of elements which specify `*`; it may be
    /// 0 if the set is addressed against an empty mailbox. Explicit zeroes are
    /// rejected.
    pub fn parse(raw: &str, splat: u32) -> Option<Self> {
        fn do_parse(r: &str, splat: u32) -> Option<u32> {
            if "*" == r {
                Some(splat)
            } else if r.is_empty() || !r.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                r.parse().ok().filter(|&v| v > 0)
            }
        }

        let mut this = Self::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = do_parse(only, splat)?;
                    this.insert_raw(only, only);
                }
                (Some(start), Some(end), None) => {
                    let start = do_parse(start, splat)?;
                    let end = do_parse(end, splat)?;
                    // RFC 3501 allows the endpoints to be in either order
                    this.insert_raw(start.min(end), end.max(start));
                }
                _ => return None,
            }
        }

        Some(this)
    }

    /// Return the total size of the sequence set.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(start, end)| (end - start) as usize + 1)
            .sum()
    }

    /// Return the maximum value in this sequence set, raw.
    pub fn max(&self) -> Option<u32> {
        self.parts.values().next_back().copied()
    }
}

impl<T> fmt::Display for SeqRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}:{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SeqRange<Seqnum> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Seqnum {}]", self)
    }
}

impl fmt::Debug for SeqRange<Uid> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Uid {}]", self)
    }
}

impl<T> Default for SeqRange<T> {
    fn default() -> Self {
        SeqRange::new()
    }
}

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case.
///
/// The `Display` format of this type is the exact string value that would be
/// sent over the wire. `FromStr` does the reverse conversion, and also
/// understands non-standard casing of the system flags.
///
/// `\Recent` is not represented by this enum since it isn't _really_ a flag.
#[derive(Clone)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Keyword(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.eq_ignore_ascii_case("\\recent") {
            Err(Error::RecentFlagNotAllowed)
        } else if s.starts_with('\\')
            || s.is_empty()
            || !s.as_bytes().iter().copied().all(is_atom_char)
        {
            Err(Error::UnsafeName)
        } else {
            Ok(Flag::Keyword(s.to_owned()))
        }
    }
}

fn is_atom_char(ch: u8) -> bool {
    !matches!(
        ch,
        0..=b' '
            | 127..=255
            | b'('
            | b')'
            | b'{'
            | b'*'
            | b'%'
            | b'\\'
            | b'"'
            | b']'
    )
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Answered, &Flag::Answered) => true,
            (&Flag::Deleted, &Flag::Deleted) => true,
            (&Flag::Draft, &Flag::Draft) => true,
            (&Flag::Flagged, &Flag::Flagged) => true,
            (&Flag::Seen, &Flag::Seen) => true,
            // Keywords are expected to be case-insensitive, though RFC 3501
            // does not say so. Only ASCII case folding applies since RFC 3501
            // has no way to express Unicode flags anyway.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => false,
        }
    }
}

impl Eq for Flag {}

bitflags! {
    struct SystemFlags: u8 {
        const ANSWERED = 1 << 0;
        const FLAGGED = 1 << 1;
        const DELETED = 1 << 2;
        const SEEN = 1 << 3;
        const DRAFT = 1 << 4;
    }
}

impl SystemFlags {
    fn of(flag: &Flag) -> Option<Self> {
        match *flag {
            Flag::Answered => Some(SystemFlags::ANSWERED),
            Flag::Flagged => Some(SystemFlags::FLAGGED),
            Flag::Deleted => Some(SystemFlags::DELETED),
            Flag::Seen => Some(SystemFlags::SEEN),
            Flag::Draft => Some(SystemFlags::DRAFT),
            Flag::Keyword(_) => None,
        }
    }
}

/// The canonical order in which system flags are reported.
const SYSTEM_FLAG_ORDER: [(SystemFlags, Flag); 5] = [
    (SystemFlags::ANSWERED, Flag::Answered),
    (SystemFlags::FLAGGED, Flag::Flagged),
    (SystemFlags::DELETED, Flag::Deleted),
    (SystemFlags::SEEN, Flag::Seen),
    (SystemFlags::DRAFT, Flag::Draft),
];

/// A set of flags on a message.
///
/// Membership is case-insensitive for keywords. Iteration yields the system
/// flags in canonical order followed by keywords in the order they were
/// first inserted, with the casing they were first inserted with.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    system: SystemFlags,
    keywords: Vec<String>,
}

impl Default for SystemFlags {
    fn default() -> Self {
        SystemFlags::empty()
    }
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        match (SystemFlags::of(flag), flag) {
            (Some(sys), _) => self.system.contains(sys),
            (None, Flag::Keyword(kw)) => {
                self.keywords.iter().any(|k| k.eq_ignore_ascii_case(kw))
            }
            (None, _) => false,
        }
    }

    /// Add `flag`, returning whether anything changed.
    pub fn insert(&mut self, flag: Flag) -> bool {
        if self.contains(&flag) {
            return false;
        }

        match (SystemFlags::of(&flag), flag) {
            (Some(sys), _) => self.system.insert(sys),
            (None, Flag::Keyword(kw)) => self.keywords.push(kw),
            (None, _) => {}
        }
        true
    }

    /// Remove `flag`, returning whether anything changed.
    pub fn remove(&mut self, flag: &Flag) -> bool {
        if !self.contains(flag) {
            return false;
        }

        match (SystemFlags::of(flag), flag) {
            (Some(sys), _) => self.system.remove(sys),
            (None, Flag::Keyword(kw)) => {
                self.keywords.retain(|k| !k.eq_ignore_ascii_case(kw))
            }
            (None, _) => {}
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.system.bits().count_ones() as usize + self.keywords.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        SYSTEM_FLAG_ORDER
            .iter()
            .filter(move |&&(sys, _)| self.system.contains(sys))
            .map(|(_, flag)| flag.clone())
            .chain(self.keywords.iter().cloned().map(Flag::Keyword))
    }

    /// Return the keywords in insertion order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> + '_ {
        self.keywords.iter().map(String::as_str)
    }

    pub fn union(&self, other: &FlagSet) -> FlagSet {
        let mut result = self.clone();
        for flag in other.iter() {
            result.insert(flag);
        }
        result
    }

    pub fn difference(&self, other: &FlagSet) -> FlagSet {
        let mut result = self.clone();
        for flag in other.iter() {
            result.remove(&flag);
        }
        result
    }

    /// Return whether `self` and `other` hold the same flags, regardless of
    /// keyword order or casing.
    pub fn same_as(&self, other: &FlagSet) -> bool {
        self.len() == other.len() && self.iter().all(|f| other.contains(&f))
    }

    /// Split off `\Deleted`, which is tracked per mailbox rather than per
    /// message, returning whether it was present.
    pub fn take_deleted(&mut self) -> bool {
        self.remove(&Flag::Deleted)
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(it: I) -> Self {
        let mut set = FlagSet::new();
        for flag in it {
            set.insert(flag);
        }
        set
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// How a `STORE` (or a remote update) changes the flags of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagChange {
    /// Replace the flags wholesale.
    Set(FlagSet),
    /// Add the given flags.
    Add(FlagSet),
    /// Remove the given flags.
    Remove(FlagSet),
}

impl FlagChange {
    pub fn apply(&self, current: &FlagSet) -> FlagSet {
        match *self {
            FlagChange::Set(ref flags) => flags.clone(),
            FlagChange::Add(ref flags) => current.union(flags),
            FlagChange::Remove(ref flags) => current.difference(flags),
        }
    }

    /// Fold `later` into `self` so that applying the result is equivalent to
    /// applying `self` and then `later`.
    ///
    /// Returns `None` if no single change can express both.
    pub fn then(&self, later: &FlagChange) -> Option<FlagChange> {
        use self::FlagChange::*;

        match (self, later) {
            (_, Set(b)) => Some(Set(b.clone())),
            (Set(a), Add(b)) => Some(Set(a.union(b))),
            (Set(a), Remove(b)) => Some(Set(a.difference(b))),
            (Add(a), Add(b)) => Some(Add(a.union(b))),
            (Remove(a), Remove(b)) => Some(Remove(a.union(b))),
            (Add(_), Remove(_)) | (Remove(_), Add(_)) => None,
        }
    }

    pub fn flags(&self) -> &FlagSet {
        match *self {
            FlagChange::Set(ref f)
            | FlagChange::Add(ref f)
            | FlagChange::Remove(ref f) => f,
        }
    }

    /// Return the same kind of change restricted to `\Deleted`, and the
    /// change with `\Deleted` removed.
    ///
    /// `\Deleted` lives on the mailbox membership while everything else lives
    /// on the message, so a single `STORE` becomes two updates.
    pub fn split_deleted(&self) -> (Option<bool>, FlagChange) {
        let mut rest = self.flags().clone();
        let has_deleted = rest.take_deleted();
        let deleted = match *self {
            FlagChange::Set(_) => Some(has_deleted),
            FlagChange::Add(_) => Some(true).filter(|_| has_deleted),
            FlagChange::Remove(_) => Some(false).filter(|_| has_deleted),
        };

        let rest = match *self {
            FlagChange::Set(_) => FlagChange::Set(rest),
            FlagChange::Add(_) => FlagChange::Add(rest),
            FlagChange::Remove(_) => FlagChange::Remove(rest),
        };

        (deleted, rest)
    }

    /// Whether this change could alter anything at all.
    pub fn is_noop(&self) -> bool {
        match *self {
            FlagChange::Set(_) => false,
            FlagChange::Add(ref f) | FlagChange::Remove(ref f) => f.is_empty(),
        }
    }
}

/// Attributes that may be applied to mailboxes in `LIST` and `LSUB`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MailboxAttribute {
    Noselect,
    Noinferiors,
}

impl MailboxAttribute {
    pub fn name(&self) -> &'static str {
        match *self {
            MailboxAttribute::Noselect => "\\Noselect",
            MailboxAttribute::Noinferiors => "\\Noinferiors",
        }
    }
}

impl fmt::Display for MailboxAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for MailboxAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <MailboxAttribute as fmt::Display>::fmt(self, f)
    }
}

/// The `STATUS` command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusRequest {
    /// The mailbox to query.
    pub name: String,
    /// Return the number of messages.
    pub messages: bool,
    /// Return the number of \Recent messages.
    pub recent: bool,
    /// Return the next UID value
    pub uidnext: bool,
    /// Return the UID validity
    pub uidvalidity: bool,
    /// Return the number of not-\Seen messages.
    pub unseen: bool,
}

/// The `STATUS` response
///
/// Fields are only set if requested in the request. Those fields' meanings
/// correspond exactly to the fields of the same name in `StatusRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusResponse {
    /// The mailbox being reported
    pub name: String,
    pub messages: Option<usize>,
    pub recent: Option<usize>,
    pub uidnext: Option<Uid>,
    pub uidvalidity: Option<u32>,
    pub unseen: Option<usize>,
}

/// Request used for implementing `LIST` and `LSUB`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListRequest {
    /// The "reference" of the list, prepended to the pattern.
    pub reference: String,
    /// The pattern, possibly containing `*` and `%` wildcards.
    pub pattern: String,
    /// If true, only list subscribed mailboxes, and report unsubscribed
    /// parents of `%` matches as `\Noselect`.
    pub lsub: bool,
}

/// A `LIST` or `LSUB` response.
///
/// The delimiter is not included since it is global.
#[derive(Debug, Clone, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct ListResponse {
    /// The canonical name of this mailbox.
    pub name: String,
    /// Any attributes on this mailbox.
    pub attributes: Vec<MailboxAttribute>,
}

/// All information needed to produce a response to a `SELECT` or `EXAMINE`
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectResponse {
    /// The currently-defined flags. Used for both the `FLAGS` response and the
    /// `PERMANENTFLAGS` response-code. For the latter, `\*` must also be
    /// added.
    /// `* FLAGS (flags...)`
    /// `* OK [PERMANENTFLAGS (flags... \*)]`
    pub flags: Vec<Flag>,
    /// The number of messages that currently exist.
    /// `* exists EXISTS`
    pub exists: usize,
    /// The number of messages with the `\Recent` pseudo-flag.
    /// `* recent RECENT`
    pub recent: usize,
    /// The sequence number of the first message without the `\Seen` flag.
    /// `None` if all messages are seen. IMAP offers no way to indicate the
    /// latter state.
    /// `* OK [UNSEEN unseen]`
    pub unseen: Option<Seqnum>,
    /// The probable next UID.
    /// `* OK [UIDNEXT uidnext]`
    pub uidnext: Uid,
    /// The current UID validity.
    /// `* OK [UIDVALIDITY uidvalidity]`
    pub uidvalidity: u32,
    /// Whether the mailbox is read-only.
    /// `TAG OK [READ-WRITE|READ-ONLY]`
    pub read_only: bool,
}

/// Unsolicited responses that can be sent after commands (other than `FETCH`,
/// `STORE`, `SEARCH`, `COPY`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PollResponse {
    /// Any messages to report as expunged.
    ///
    /// This is sorted by *descending* sequence number, which is the order the
    /// `EXPUNGE` responses must be sent in so that each sequence number is
    /// still valid when the client sees it.
    ///
    /// ```text
    /// * expunge[0] EXPUNGE
    /// * expunge[1] EXPUNGE
    /// ...
    /// ```
    pub expunge: Vec<(Seqnum, Uid)>,
    /// If the mailbox size has changed, the new size.
    /// `* exists EXISTS`
    pub exists: Option<usize>,
    /// If there are new messages, the new recent count.
    /// `* recent RECENT`
    pub recent: Option<usize>,
    /// UIDs of messages that should be sent in unsolicited `FETCH` responses
    /// because their flags changed.
    pub fetch: Vec<Uid>,
    /// Whether the set of flags in use grew, so `* FLAGS` should be resent.
    pub flags: Option<Vec<Flag>>,
}

/// Request information for `STORE` and `UID STORE`.
#[derive(Clone, Debug)]
pub struct StoreRequest<'a, ID>
where
    SeqRange<ID>: fmt::Debug,
{
    /// The message(s) to affect.
    pub ids: &'a SeqRange<ID>,
    /// What to do to the flags.
    pub change: FlagChange,
    /// Whether to suppress the `FETCH` response to this session.
    pub silent: bool,
}

/// Request information for `FETCH` and `UID FETCH`.
#[derive(Clone, Debug, Default)]
pub struct FetchRequest<ID>
where
    SeqRange<ID>: fmt::Debug,
{
    /// The messages to fetch.
    pub ids: SeqRange<ID>,
    /// Return UIDs.
    pub uid: bool,
    /// Return flags.
    pub flags: bool,
    /// Return `RFC822.SIZE`.
    pub rfc822size: bool,
    /// Return `INTERNALDATE`.
    pub internal_date: bool,
    /// Return `ENVELOPE`.
    pub envelope: bool,
    /// Return `BODYSTRUCTURE` (with extension data).
    pub bodystructure: bool,
    /// Return `BODY` (the non-extensible structure).
    pub body: bool,
    /// Body sections to fetch.
    pub sections: Vec<crate::mime::fetch::section::BodySection>,
    /// Whether fetching implicitly sets `\Seen`, i.e., some section was
    /// requested without `.PEEK`.
    pub set_seen: bool,
}

/// The query for the `SEARCH` command.
///
/// This is a very direct representation of the IMAP search query as an AST,
/// since some of the quirks (such as the "Un$flag" queries) are purely
/// syntactic and it is easier to keep all the translation logic in one place.
/// Strings have already been decoded from the request charset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchQuery {
    SequenceSet(SeqRange<Seqnum>),
    All,
    Answered,
    Bcc(String),
    Before(NaiveDate),
    Body(String),
    Cc(String),
    Deleted,
    Draft,
    Flagged,
    From(String),
    Header(String, String),
    Keyword(String),
    Larger(u32),
    New,
    Not(Box<SearchQuery>),
    Old, // NB "NOT RECENT", not "NOT NEW"
    On(NaiveDate),
    Or(Box<SearchQuery>, Box<SearchQuery>),
    Recent,
    Seen,
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    Since(NaiveDate),
    Smaller(u32),
    Subject(String),
    Text(String),
    To(String),
    UidSet(SeqRange<Uid>), // RFC 3501 calls it "UID"; "Set" for disambiguation
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unkeyword(String),
    Unseen,
    And(Vec<SearchQuery>),
}

/// The response from `COPY`, `UID COPY`, `MOVE`, and `UID MOVE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyResponse {
    /// The UID validity of the destination mailbox.
    pub uid_validity: u32,
    /// The source UIDs, in ascending order.
    pub from_uids: SeqRange<Uid>,
    /// The new UIDs, in positional correspondence with `from_uids`.
    pub to_uids: SeqRange<Uid>,
}

/// The response from `APPEND`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendResponse {
    /// The UID validity of the destination mailbox.
    pub uid_validity: u32,
    /// The UID of the new message.
    pub uid: Uid,
}

/// A message being added by `APPEND`, by the recovery mailbox, or by the
/// remote store.
///
/// The literal itself must already be in the literal store under `id`.
#[derive(Clone, Debug)]
pub struct NewMessage {
    /// The gateway id of the message.
    pub id: MessageId,
    /// The remote id, if the remote store knows the message at all.
    pub remote_id: Option<RemoteMessageId>,
    /// The message flags, excluding `\Deleted`.
    pub flags: FlagSet,
    /// Whether the message carries `\Deleted` in its target mailbox.
    pub deleted: bool,
    /// The internal date.
    pub internal_date: DateTime<FixedOffset>,
    /// The size of the stored literal in bytes.
    pub size: usize,
    /// For messages stashed in the recovery mailbox, the hash used to
    /// recognise duplicate failed appends.
    pub recovery_hash: Option<[u8; 32]>,
}
