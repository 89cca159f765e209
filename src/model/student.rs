use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::model::common::{
    Address, ContactPerson, Gender, check_non_negative, check_range, normalize_email, require_text,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum Course {
    #[serde(rename = "Computer Science")]
    #[strum(serialize = "Computer Science")]
    ComputerScience,
    Mechanical,
    Electrical,
    Civil,
    Electronics,
    Chemical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Graduated,
    Dropped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AcademicInfo {
    pub cgpa: f64,
    pub total_credits: u32,
    pub attendance_percentage: f64,
}

impl AcademicInfo {
    fn validate(&self) -> AppResult<()> {
        check_range("academicInfo.cgpa", self.cgpa, 0.0, 10.0)?;
        check_range(
            "academicInfo.attendancePercentage",
            self.attendance_percentage,
            0.0,
            100.0,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeStatus {
    pub total_fee: f64,
    pub paid_amount: f64,
    /// Derived: `totalFee - paidAmount`, never below zero
    #[serde(skip_deserializing)]
    pub pending_amount: f64,
    pub last_payment_date: Option<NaiveDate>,
}

impl FeeStatus {
    pub fn pending(total_fee: f64, paid_amount: f64) -> f64 {
        (total_fee - paid_amount).max(0.0)
    }

    fn validate(&self) -> AppResult<()> {
        check_non_negative("feeStatus.totalFee", self.total_fee)?;
        check_non_negative("feeStatus.paidAmount", self.paid_amount)
    }
}

/// SQL expression keeping `pending_amount` in step with the fee columns.
pub const PENDING_AMOUNT_SQL: &str = "pending_amount = GREATEST(total_fee - paid_amount, 0)";

#[derive(Debug, sqlx::FromRow)]
pub struct StudentRow {
    pub id: u64,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub address: Json<Address>,
    pub course: String,
    pub year: u8,
    pub semester: u8,
    pub enrollment_date: NaiveDate,
    pub guardian_info: Json<ContactPerson>,
    pub cgpa: f64,
    pub total_credits: u32,
    pub attendance_percentage: f64,
    pub total_fee: f64,
    pub paid_amount: f64,
    pub pending_amount: f64,
    pub last_payment_date: Option<NaiveDate>,
    pub status: String,
    pub profile_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "CS2024001")]
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    #[schema(example = "asha.rao@college.edu")]
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    #[schema(example = "Female")]
    pub gender: String,
    pub address: Address,
    #[schema(example = "Computer Science")]
    pub course: String,
    pub year: u8,
    pub semester: u8,
    pub enrollment_date: NaiveDate,
    pub guardian_info: ContactPerson,
    pub academic_info: AcademicInfo,
    pub fee_status: FeeStatus,
    #[schema(example = "Active")]
    pub status: String,
    pub profile_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Self {
            id: row.id,
            full_name: format!("{} {}", row.first_name, row.last_name),
            student_id: row.student_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            address: row.address.0,
            course: row.course,
            year: row.year,
            semester: row.semester,
            enrollment_date: row.enrollment_date,
            guardian_info: row.guardian_info.0,
            academic_info: AcademicInfo {
                cgpa: row.cgpa,
                total_credits: row.total_credits,
                attendance_percentage: row.attendance_percentage,
            },
            fee_status: FeeStatus {
                total_fee: row.total_fee,
                paid_amount: row.paid_amount,
                pending_amount: row.pending_amount,
                last_payment_date: row.last_payment_date,
            },
            status: row.status,
            profile_image: row.profile_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudent {
    #[schema(example = "CS2024001")]
    pub student_id: String,
    #[schema(example = "Asha")]
    pub first_name: String,
    #[schema(example = "Rao")]
    pub last_name: String,
    #[schema(example = "asha.rao@college.edu")]
    pub email: String,
    #[schema(example = "+919800000000")]
    pub phone: String,
    #[schema(example = "2005-04-12")]
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub address: Address,
    pub course: Course,
    #[schema(example = 1)]
    pub year: u8,
    #[schema(example = 1)]
    pub semester: u8,
    pub enrollment_date: Option<NaiveDate>,
    #[serde(default)]
    pub guardian_info: ContactPerson,
    #[serde(default)]
    pub academic_info: AcademicInfo,
    #[serde(default)]
    pub fee_status: FeeStatus,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default)]
    pub profile_image: String,
}

impl CreateStudent {
    /// Trims and validates the payload and fills the derived fee amount.
    pub fn normalize(mut self) -> AppResult<Self> {
        self.student_id = require_text("studentId", &self.student_id)?;
        self.first_name = require_text("firstName", &self.first_name)?;
        self.last_name = require_text("lastName", &self.last_name)?;
        self.email = normalize_email(&self.email)?;
        self.phone = require_text("phone", &self.phone)?;
        check_range("year", self.year, 1, 4)?;
        check_range("semester", self.semester, 1, 8)?;
        self.academic_info.validate()?;
        self.fee_status.validate()?;
        self.fee_status.pending_amount =
            FeeStatus::pending(self.fee_status.total_fee, self.fee_status.paid_amount);
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeeStatusPatch {
    pub total_fee: Option<f64>,
    pub paid_amount: Option<f64>,
    pub last_payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcademicInfoPatch {
    pub cgpa: Option<f64>,
    pub total_credits: Option<u32>,
    pub attendance_percentage: Option<f64>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudent {
    pub student_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<Address>,
    pub course: Option<Course>,
    pub year: Option<u8>,
    pub semester: Option<u8>,
    pub enrollment_date: Option<NaiveDate>,
    pub guardian_info: Option<ContactPerson>,
    pub academic_info: Option<AcademicInfoPatch>,
    pub fee_status: Option<FeeStatusPatch>,
    pub status: Option<StudentStatus>,
    pub profile_image: Option<String>,
}

impl UpdateStudent {
    pub fn normalize(mut self) -> AppResult<Self> {
        if let Some(v) = self.student_id.take() {
            self.student_id = Some(require_text("studentId", &v)?);
        }
        if let Some(v) = self.first_name.take() {
            self.first_name = Some(require_text("firstName", &v)?);
        }
        if let Some(v) = self.last_name.take() {
            self.last_name = Some(require_text("lastName", &v)?);
        }
        if let Some(v) = self.email.take() {
            self.email = Some(normalize_email(&v)?);
        }
        if let Some(v) = self.phone.take() {
            self.phone = Some(require_text("phone", &v)?);
        }
        if let Some(year) = self.year {
            check_range("year", year, 1, 4)?;
        }
        if let Some(semester) = self.semester {
            check_range("semester", semester, 1, 8)?;
        }
        if let Some(info) = &self.academic_info {
            if let Some(cgpa) = info.cgpa {
                check_range("academicInfo.cgpa", cgpa, 0.0, 10.0)?;
            }
            if let Some(pct) = info.attendance_percentage {
                check_range("academicInfo.attendancePercentage", pct, 0.0, 100.0)?;
            }
        }
        if let Some(fee) = &self.fee_status {
            if let Some(total) = fee.total_fee {
                check_non_negative("feeStatus.totalFee", total)?;
            }
            if let Some(paid) = fee.paid_amount {
                check_non_negative("feeStatus.paidAmount", paid)?;
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    fn payload() -> serde_json::Value {
        json!({
            "studentId": " CS2024001 ",
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "Asha.Rao@College.edu",
            "phone": "+919800000000",
            "dateOfBirth": "2005-04-12",
            "gender": "Female",
            "course": "Computer Science",
            "year": 2,
            "semester": 3,
            "feeStatus": { "totalFee": 90000.0, "paidAmount": 30000.0 }
        })
    }

    #[test]
    fn create_payload_normalizes_and_derives_pending_fee() {
        let student: CreateStudent = serde_json::from_value(payload()).unwrap();
        let student = student.normalize().unwrap();

        assert_eq!(student.student_id, "CS2024001");
        assert_eq!(student.email, "asha.rao@college.edu");
        assert_eq!(student.course, Course::ComputerScience);
        assert_eq!(student.status, StudentStatus::Active);
        assert_eq!(student.address.country, "India");
        assert_eq!(student.fee_status.pending_amount, 60000.0);
    }

    #[test]
    fn pending_fee_never_negative() {
        assert_eq!(FeeStatus::pending(1000.0, 1500.0), 0.0);
    }

    #[test]
    fn client_cannot_set_pending_amount() {
        let mut body = payload();
        body["feeStatus"]["pendingAmount"] = json!(5.0);
        let student: CreateStudent = serde_json::from_value(body).unwrap();
        assert_eq!(student.normalize().unwrap().fee_status.pending_amount, 60000.0);
    }

    #[test]
    fn rejects_year_out_of_range() {
        let mut body = payload();
        body["year"] = json!(5);
        let student: CreateStudent = serde_json::from_value(body).unwrap();
        assert!(matches!(student.normalize(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_unknown_course() {
        let mut body = payload();
        body["course"] = json!("Astrology");
        assert!(serde_json::from_value::<CreateStudent>(body).is_err());
    }

    #[test]
    fn update_validates_only_present_fields() {
        let patch: UpdateStudent = serde_json::from_value(json!({ "semester": 9 })).unwrap();
        assert!(patch.normalize().is_err());

        let patch: UpdateStudent =
            serde_json::from_value(json!({ "email": " NEW@College.edu " })).unwrap();
        assert_eq!(
            patch.normalize().unwrap().email.as_deref(),
            Some("new@college.edu")
        );
    }

    #[test]
    fn course_uses_display_names() {
        assert_eq!(Course::ComputerScience.as_ref(), "Computer Science");
        assert_eq!("Civil".parse::<Course>().unwrap(), Course::Civil);
    }
}
