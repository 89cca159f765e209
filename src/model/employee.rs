use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::model::common::{
    Address, ContactPerson, Gender, check_non_negative, normalize_email, require_text,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum Department {
    #[serde(rename = "Computer Science")]
    #[strum(serialize = "Computer Science")]
    ComputerScience,
    Mechanical,
    Electrical,
    Civil,
    Electronics,
    Chemical,
    Administration,
    Library,
    Finance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum EmployeeType {
    Teaching,
    #[serde(rename = "Non-Teaching")]
    #[strum(serialize = "Non-Teaching")]
    NonTeaching,
    Administrative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
    Resigned,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Salary {
    #[schema(example = 50000.0)]
    pub basic: f64,
    #[serde(default)]
    #[schema(example = 8000.0)]
    pub allowances: f64,
    #[serde(default)]
    #[schema(example = 3000.0)]
    pub deductions: f64,
    /// Derived on every save
    #[serde(default, skip_deserializing)]
    pub net_salary: f64,
}

impl Salary {
    pub fn new(basic: f64, allowances: f64, deductions: f64) -> Self {
        Self {
            basic,
            allowances,
            deductions,
            net_salary: net_salary(basic, allowances, deductions),
        }
    }

    fn validate(&self) -> AppResult<()> {
        check_non_negative("salary.basic", self.basic)?;
        check_non_negative("salary.allowances", self.allowances)?;
        check_non_negative("salary.deductions", self.deductions)
    }
}

pub fn net_salary(basic: f64, allowances: f64, deductions: f64) -> f64 {
    basic + allowances - deductions
}

/// SQL expression recomputing `net_salary` after a partial salary update.
pub const NET_SALARY_SQL: &str = "net_salary = basic_salary + allowances - deductions";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Qualification {
    pub degree: Option<String>,
    pub institution: Option<String>,
    pub year: Option<i32>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviousOrganization {
    pub name: Option<String>,
    pub designation: Option<String>,
    pub duration: Option<String>,
    pub responsibilities: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub total_years: f64,
    pub previous_organizations: Vec<PreviousOrganization>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct EmployeeRow {
    pub id: u64,
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub address: Json<Address>,
    pub department: String,
    pub designation: String,
    pub employee_type: String,
    pub joining_date: NaiveDate,
    pub basic_salary: f64,
    pub allowances: f64,
    pub deductions: f64,
    pub net_salary: f64,
    pub qualifications: Json<Vec<Qualification>>,
    pub experience_years: f64,
    pub previous_organizations: Json<Vec<PreviousOrganization>>,
    pub emergency_contact: Json<ContactPerson>,
    pub status: String,
    pub profile_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "EMP-001")]
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub address: Address,
    #[schema(example = "Computer Science")]
    pub department: String,
    #[schema(example = "Assistant Professor")]
    pub designation: String,
    #[schema(example = "Teaching")]
    pub employee_type: String,
    pub joining_date: NaiveDate,
    pub salary: Salary,
    pub qualifications: Vec<Qualification>,
    pub experience: Experience,
    pub emergency_contact: ContactPerson,
    #[schema(example = "Active")]
    pub status: String,
    pub profile_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Self {
            id: row.id,
            full_name: format!("{} {}", row.first_name, row.last_name),
            employee_id: row.employee_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            address: row.address.0,
            department: row.department,
            designation: row.designation,
            employee_type: row.employee_type,
            joining_date: row.joining_date,
            salary: Salary {
                basic: row.basic_salary,
                allowances: row.allowances,
                deductions: row.deductions,
                net_salary: row.net_salary,
            },
            qualifications: row.qualifications.0,
            experience: Experience {
                total_years: row.experience_years,
                previous_organizations: row.previous_organizations.0,
            },
            emergency_contact: row.emergency_contact.0,
            status: row.status,
            profile_image: row.profile_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployee {
    #[schema(example = "EMP-001")]
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub address: Address,
    pub department: Department,
    pub designation: String,
    pub employee_type: EmployeeType,
    pub joining_date: NaiveDate,
    pub salary: Salary,
    #[serde(default)]
    pub qualifications: Vec<Qualification>,
    #[serde(default)]
    pub experience: Experience,
    #[serde(default)]
    pub emergency_contact: ContactPerson,
    #[serde(default)]
    pub status: EmployeeStatus,
    #[serde(default)]
    pub profile_image: String,
}

impl CreateEmployee {
    /// Trims and validates the payload and computes the net salary.
    pub fn normalize(mut self) -> AppResult<Self> {
        self.employee_id = require_text("employeeId", &self.employee_id)?;
        self.first_name = require_text("firstName", &self.first_name)?;
        self.last_name = require_text("lastName", &self.last_name)?;
        self.email = normalize_email(&self.email)?;
        self.phone = require_text("phone", &self.phone)?;
        self.designation = require_text("designation", &self.designation)?;
        self.salary.validate()?;
        self.salary = Salary::new(self.salary.basic, self.salary.allowances, self.salary.deductions);
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalaryPatch {
    pub basic: Option<f64>,
    pub allowances: Option<f64>,
    pub deductions: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmployee {
    pub employee_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<Address>,
    pub department: Option<Department>,
    pub designation: Option<String>,
    pub employee_type: Option<EmployeeType>,
    pub joining_date: Option<NaiveDate>,
    pub salary: Option<SalaryPatch>,
    pub qualifications: Option<Vec<Qualification>>,
    pub experience: Option<Experience>,
    pub emergency_contact: Option<ContactPerson>,
    pub status: Option<EmployeeStatus>,
    pub profile_image: Option<String>,
}

impl UpdateEmployee {
    pub fn normalize(mut self) -> AppResult<Self> {
        if let Some(v) = self.employee_id.take() {
            self.employee_id = Some(require_text("employeeId", &v)?);
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
        if let Some(v) = self.designation.take() {
            self.designation = Some(require_text("designation", &v)?);
        }
        if let Some(salary) = &self.salary {
            for (field, value) in [
                ("salary.basic", salary.basic),
                ("salary.allowances", salary.allowances),
                ("salary.deductions", salary.deductions),
            ] {
                if let Some(v) = value {
                    check_non_negative(field, v)?;
                }
            }
        }
        Ok(self)
    }
}
