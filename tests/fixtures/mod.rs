//! Scripted cheque scenarios for the fake detector and recognizer.

/// One region the fake detector reports.
#[derive(Debug, Clone, Copy)]
pub struct RegionFixture {
    pub label: &'static str,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// A synthetic cheque image plus what the models "see" on it.
#[derive(Debug, Clone)]
pub struct ChequeFixture {
    pub width: u32,
    pub height: u32,
    pub regions: &'static [RegionFixture],
    /// Raw recognizer output for the account crop.
    pub recognizer_reply: &'static str,
    /// What the job should report as `recognized_text`.
    pub expected_digits: &'static str,
    pub description: &'static str,
}

pub const PAYEE_AND_ACCOUNT: ChequeFixture = ChequeFixture {
    width: 400,
    height: 180,
    regions: &[
        RegionFixture {
            label: "payee",
            confidence: 0.92,
            bbox: [20.0, 30.0, 260.0, 60.0],
        },
        RegionFixture {
            label: "account",
            confidence: 0.88,
            bbox: [40.0, 140.0, 220.0, 170.0],
        },
    ],
    recognizer_reply: " 0012 3456 7890\n",
    expected_digits: "001234567890",
    description: "payee line and MICR account band",
};

pub const PAYEE_ONLY: ChequeFixture = ChequeFixture {
    width: 400,
    height: 180,
    regions: &[RegionFixture {
        label: "payee",
        confidence: 0.92,
        bbox: [20.0, 30.0, 260.0, 60.0],
    }],
    recognizer_reply: "999",
    expected_digits: "",
    description: "no account band detected",
};
