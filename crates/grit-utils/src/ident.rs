use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::{Local, Offset, TimeZone};

/// A point in time as git records it: seconds since the Unix epoch plus
/// the recording zone's offset from UTC in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct When {
    pub seconds: i64,
    pub offset_minutes: i32,
}

impl When {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// The current time in the local zone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            seconds: now.timestamp(),
            offset_minutes: now.offset().fix().local_minus_utc() / 60,
        }
    }

    /// Format the offset as git's signed four-digit `±HHMM`.
    pub fn offset_string(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.unsigned_abs();
        format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
    }

    /// Parse a `±HHMM` zone string. Anything unparseable yields offset 0.
    pub fn parse_offset(s: &[u8]) -> i32 {
        if s.len() != 5 || (s[0] != b'+' && s[0] != b'-') {
            return 0;
        }
        let digits = std::str::from_utf8(&s[1..]).ok().and_then(|d| {
            if d.bytes().all(|b| b.is_ascii_digit()) {
                d.parse::<i32>().ok()
            } else {
                None
            }
        });
        match digits {
            Some(hhmm) => {
                let minutes = (hhmm / 100) * 60 + hhmm % 100;
                if s[0] == b'-' {
                    -minutes
                } else {
                    minutes
                }
            }
            None => 0,
        }
    }

    /// Render as a chrono `DateTime` in the recorded zone, if representable.
    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        let offset = chrono::FixedOffset::east_opt(self.offset_minutes * 60)?;
        offset.timestamp_opt(self.seconds, 0).single()
    }
}

/// Who did something and when: the `author`, `committer`, and `tagger`
/// header payload of commit and tag objects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub name: BString,
    pub email: BString,
    pub when: When,
}

impl Identity {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, when: When) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// Parse git's `Name <email> seconds ±HHMM` identity line.
    ///
    /// Real-world objects contain every imaginable malformation, so this
    /// never fails: a missing `<...>` leaves the email empty, a missing
    /// or garbled timestamp leaves the time zeroed.
    pub fn parse(input: &BStr) -> Self {
        let input: &[u8] = input.as_ref();

        let lt = input.find_byte(b'<');
        let gt = lt.and_then(|lt| input[lt..].find_byte(b'>').map(|p| p + lt));

        let (name, email, rest) = match (lt, gt) {
            (Some(lt), Some(gt)) => (
                input[..lt].trim(),
                &input[lt + 1..gt],
                input[gt + 1..].trim(),
            ),
            _ => (input.trim(), &b""[..], &b""[..]),
        };

        let mut when = When::default();
        let mut fields = rest.fields();
        if let Some(secs) = fields.next() {
            if let Ok(s) = std::str::from_utf8(secs) {
                when.seconds = s.parse().unwrap_or(0);
            }
        }
        if let Some(zone) = fields.next() {
            when.offset_minutes = When::parse_offset(zone);
        }

        Self {
            name: BString::from(name),
            email: BString::from(email),
            when,
        }
    }

    /// Serialize in git's canonical identity format.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::from(Vec::new());
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(self.when.seconds.to_string().as_bytes());
        out.push(b' ');
        out.push_str(self.when.offset_string().as_bytes());
        out
    }
}
