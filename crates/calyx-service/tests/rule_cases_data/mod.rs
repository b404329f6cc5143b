// Shared between the expander's unit tests and the integration tests.

/// One DTSTART + RRULE pair and the recurrence-ids it must produce.
pub struct RuleCase {
    pub name: &'static str,
    pub dtstart: &'static str,
    pub rrule: &'static str,
    pub expected: &'static [&'static str],
}

pub const RULE_CASES: &[RuleCase] = &[
    RuleCase {
        name: "weekly-count",
        dtstart: "20240101T090000Z",
        rrule: "FREQ=WEEKLY;COUNT=5",
        expected: &[
            "20240101T090000Z",
            "20240108T090000Z",
            "20240115T090000Z",
            "20240122T090000Z",
            "20240129T090000Z",
        ],
    },
    RuleCase {
        name: "daily-until-after-last-start",
        dtstart: "20240101T090000Z",
        rrule: "FREQ=DAILY;UNTIL=20240105T000000Z",
        expected: &[
            "20240101T090000Z",
            "20240102T090000Z",
            "20240103T090000Z",
            "20240104T090000Z",
        ],
    },
    RuleCase {
        name: "daily-until-inclusive",
        dtstart: "20240101T000000Z",
        rrule: "FREQ=DAILY;UNTIL=20240105T000000Z",
        expected: &[
            "20240101T000000Z",
            "20240102T000000Z",
            "20240103T000000Z",
            "20240104T000000Z",
            "20240105T000000Z",
        ],
    },
    RuleCase {
        name: "last-friday",
        dtstart: "20240126T100000Z",
        rrule: "FREQ=MONTHLY;BYDAY=-1FR;COUNT=3",
        expected: &["20240126T100000Z", "20240223T100000Z", "20240329T100000Z"],
    },
    RuleCase {
        name: "biweekly-tue-thu",
        dtstart: "20240102T080000Z",
        rrule: "FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH;COUNT=4",
        expected: &[
            "20240102T080000Z",
            "20240104T080000Z",
            "20240116T080000Z",
            "20240118T080000Z",
        ],
    },
    RuleCase {
        name: "leap-day-yearly",
        dtstart: "20240229",
        rrule: "FREQ=YEARLY;COUNT=3",
        expected: &["20240229", "20280229", "20320229"],
    },
    RuleCase {
        name: "floating-daily",
        dtstart: "20240101T090000",
        rrule: "FREQ=DAILY;COUNT=2",
        expected: &["20240101T090000", "20240102T090000"],
    },
    RuleCase {
        name: "month-day-31",
        dtstart: "20240131T120000Z",
        rrule: "FREQ=MONTHLY;BYMONTHDAY=31;COUNT=3",
        expected: &["20240131T120000Z", "20240331T120000Z", "20240531T120000Z"],
    },
];
