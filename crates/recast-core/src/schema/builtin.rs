//! Built-in FHIR R4 core definitions
//!
//! One element per line: `<path> <type>[|<type>...][*]`. A trailing `*`
//! marks a repeated field. `<Name> resource` registers a resource type.

use super::SchemaTable;

const QUANTITY_PROFILES: &[&str] = &[
    "Age",
    "Count",
    "Distance",
    "Duration",
    "SimpleQuantity",
    "MoneyQuantity",
];

const R4_CORE: &str = r#"
# Base types
Element.id string
Element.extension Extension*
BackboneElement.modifierExtension Extension*
Resource.id id
Resource.meta Meta
Resource.implicitRules uri
Resource.language code
DomainResource.text Narrative
DomainResource.contained Resource*
DomainResource.extension Extension*
DomainResource.modifierExtension Extension*

# Datatypes
Extension.url uri
Extension.value[x] base64Binary|boolean|canonical|code|date|dateTime|decimal|id|instant|integer|markdown|oid|positiveInt|string|time|unsignedInt|uri|url|uuid|Address|Age|Annotation|Attachment|CodeableConcept|Coding|ContactPoint|Count|Distance|Duration|HumanName|Identifier|Money|Period|Quantity|Range|Ratio|Reference|SampledData|Signature|Timing|Meta
Meta.versionId id
Meta.lastUpdated instant
Meta.source uri
Meta.profile canonical*
Meta.security Coding*
Meta.tag Coding*
Narrative.status code
Narrative.div xhtml
Coding.system uri
Coding.version string
Coding.code code
Coding.display string
Coding.userSelected boolean
CodeableConcept.coding Coding*
CodeableConcept.text string
Reference.reference string
Reference.type uri
Reference.identifier Identifier
Reference.display string
Identifier.use code
Identifier.type CodeableConcept
Identifier.system uri
Identifier.value string
Identifier.period Period
Identifier.assigner Reference
HumanName.use code
HumanName.text string
HumanName.family string
HumanName.given string*
HumanName.prefix string*
HumanName.suffix string*
HumanName.period Period
Address.use code
Address.type code
Address.text string
Address.line string*
Address.city string
Address.district string
Address.state string
Address.postalCode string
Address.country string
Address.period Period
ContactPoint.system code
ContactPoint.value string
ContactPoint.use code
ContactPoint.rank positiveInt
ContactPoint.period Period
Period.start dateTime
Period.end dateTime
Quantity.value decimal
Quantity.comparator code
Quantity.unit string
Quantity.system uri
Quantity.code code
Range.low Quantity
Range.high Quantity
Ratio.numerator Quantity
Ratio.denominator Quantity
Money.value decimal
Money.currency code
Annotation.author[x] Reference|string
Annotation.time dateTime
Annotation.text markdown
Attachment.contentType code
Attachment.language code
Attachment.data base64Binary
Attachment.url url
Attachment.size unsignedInt
Attachment.hash base64Binary
Attachment.title string
Attachment.creation dateTime
SampledData.origin Quantity
SampledData.period decimal
SampledData.dimensions positiveInt
SampledData.data string
Signature.type Coding*
Signature.when instant
Signature.who Reference
Signature.data base64Binary
Timing.event dateTime*
Timing.repeat Element
Timing.repeat.bounds[x] Duration|Range|Period
Timing.repeat.count positiveInt
Timing.repeat.duration decimal
Timing.repeat.durationUnit code
Timing.repeat.frequency positiveInt
Timing.repeat.period decimal
Timing.repeat.periodUnit code
Timing.repeat.timeOfDay time*
Timing.code CodeableConcept
Dosage.sequence integer
Dosage.text string
Dosage.timing Timing
Dosage.asNeeded[x] boolean|CodeableConcept
Dosage.site CodeableConcept
Dosage.route CodeableConcept
Dosage.method CodeableConcept
Dosage.doseAndRate Element*
Dosage.doseAndRate.type CodeableConcept
Dosage.doseAndRate.dose[x] Range|Quantity
Dosage.doseAndRate.rate[x] Ratio|Range|Quantity

# Resources
Bundle resource
Bundle.identifier Identifier
Bundle.type code
Bundle.timestamp instant
Bundle.total unsignedInt
Bundle.entry BackboneElement*
Bundle.entry.fullUrl uri
Bundle.entry.resource Resource
Bundle.entry.request BackboneElement
Bundle.entry.request.method code
Bundle.entry.request.url uri

Patient resource
Patient.identifier Identifier*
Patient.active boolean
Patient.name HumanName*
Patient.telecom ContactPoint*
Patient.gender code
Patient.birthDate date
Patient.deceased[x] boolean|dateTime
Patient.address Address*
Patient.maritalStatus CodeableConcept
Patient.multipleBirth[x] boolean|integer
Patient.photo Attachment*
Patient.contact BackboneElement*
Patient.contact.relationship CodeableConcept*
Patient.contact.name HumanName
Patient.contact.telecom ContactPoint*
Patient.contact.address Address
Patient.contact.gender code
Patient.contact.organization Reference
Patient.contact.period Period
Patient.communication BackboneElement*
Patient.communication.language CodeableConcept
Patient.communication.preferred boolean
Patient.generalPractitioner Reference*
Patient.managingOrganization Reference
Patient.link BackboneElement*
Patient.link.other Reference
Patient.link.type code

Encounter resource
Encounter.identifier Identifier*
Encounter.status code
Encounter.class Coding
Encounter.type CodeableConcept*
Encounter.serviceType CodeableConcept
Encounter.priority CodeableConcept
Encounter.subject Reference
Encounter.participant BackboneElement*
Encounter.participant.type CodeableConcept*
Encounter.participant.period Period
Encounter.participant.individual Reference
Encounter.period Period
Encounter.length Duration
Encounter.reasonCode CodeableConcept*
Encounter.reasonReference Reference*
Encounter.hospitalization BackboneElement
Encounter.hospitalization.admitSource CodeableConcept
Encounter.hospitalization.dischargeDisposition CodeableConcept
Encounter.location BackboneElement*
Encounter.location.location Reference
Encounter.location.status code
Encounter.location.period Period
Encounter.serviceProvider Reference
Encounter.partOf Reference

Observation resource
Observation.identifier Identifier*
Observation.basedOn Reference*
Observation.partOf Reference*
Observation.status code
Observation.category CodeableConcept*
Observation.code CodeableConcept
Observation.subject Reference
Observation.focus Reference*
Observation.encounter Reference
Observation.effective[x] dateTime|Period|Timing|instant
Observation.issued instant
Observation.performer Reference*
Observation.value[x] Quantity|CodeableConcept|string|boolean|integer|Range|Ratio|SampledData|time|dateTime|Period
Observation.dataAbsentReason CodeableConcept
Observation.interpretation CodeableConcept*
Observation.note Annotation*
Observation.bodySite CodeableConcept
Observation.method CodeableConcept
Observation.specimen Reference
Observation.device Reference
Observation.referenceRange BackboneElement*
Observation.referenceRange.low Quantity
Observation.referenceRange.high Quantity
Observation.referenceRange.type CodeableConcept
Observation.referenceRange.text string
Observation.hasMember Reference*
Observation.derivedFrom Reference*
Observation.component BackboneElement*
Observation.component.code CodeableConcept
Observation.component.value[x] Quantity|CodeableConcept|string|boolean|integer|Range|Ratio|SampledData|time|dateTime|Period
Observation.component.dataAbsentReason CodeableConcept
Observation.component.interpretation CodeableConcept*

Condition resource
Condition.identifier Identifier*
Condition.clinicalStatus CodeableConcept
Condition.verificationStatus CodeableConcept
Condition.category CodeableConcept*
Condition.severity CodeableConcept
Condition.code CodeableConcept
Condition.bodySite CodeableConcept*
Condition.subject Reference
Condition.encounter Reference
Condition.onset[x] dateTime|Age|Period|Range|string
Condition.abatement[x] dateTime|Age|Period|Range|string
Condition.recordedDate dateTime
Condition.recorder Reference
Condition.asserter Reference
Condition.note Annotation*

Procedure resource
Procedure.identifier Identifier*
Procedure.basedOn Reference*
Procedure.partOf Reference*
Procedure.status code
Procedure.statusReason CodeableConcept
Procedure.category CodeableConcept
Procedure.code CodeableConcept
Procedure.subject Reference
Procedure.encounter Reference
Procedure.performed[x] dateTime|Period|string|Age|Range
Procedure.recorder Reference
Procedure.asserter Reference
Procedure.performer BackboneElement*
Procedure.performer.function CodeableConcept
Procedure.performer.actor Reference
Procedure.location Reference
Procedure.reasonCode CodeableConcept*
Procedure.reasonReference Reference*
Procedure.bodySite CodeableConcept*
Procedure.outcome CodeableConcept
Procedure.note Annotation*

ServiceRequest resource
ServiceRequest.identifier Identifier*
ServiceRequest.basedOn Reference*
ServiceRequest.replaces Reference*
ServiceRequest.status code
ServiceRequest.intent code
ServiceRequest.category CodeableConcept*
ServiceRequest.priority code
ServiceRequest.doNotPerform boolean
ServiceRequest.code CodeableConcept
ServiceRequest.orderDetail CodeableConcept*
ServiceRequest.quantity[x] Quantity|Ratio|Range
ServiceRequest.subject Reference
ServiceRequest.encounter Reference
ServiceRequest.occurrence[x] dateTime|Period|Timing
ServiceRequest.asNeeded[x] boolean|CodeableConcept
ServiceRequest.authoredOn dateTime
ServiceRequest.requester Reference
ServiceRequest.performer Reference*
ServiceRequest.reasonCode CodeableConcept*
ServiceRequest.reasonReference Reference*
ServiceRequest.bodySite CodeableConcept*
ServiceRequest.note Annotation*

MedicationRequest resource
MedicationRequest.identifier Identifier*
MedicationRequest.status code
MedicationRequest.intent code
MedicationRequest.category CodeableConcept*
MedicationRequest.priority code
MedicationRequest.reported[x] boolean|Reference
MedicationRequest.medication[x] CodeableConcept|Reference
MedicationRequest.subject Reference
MedicationRequest.encounter Reference
MedicationRequest.authoredOn dateTime
MedicationRequest.requester Reference
MedicationRequest.reasonCode CodeableConcept*
MedicationRequest.reasonReference Reference*
MedicationRequest.basedOn Reference*
MedicationRequest.note Annotation*
MedicationRequest.dosageInstruction Dosage*
MedicationRequest.dispenseRequest BackboneElement
MedicationRequest.dispenseRequest.validityPeriod Period
MedicationRequest.dispenseRequest.numberOfRepeatsAllowed unsignedInt
MedicationRequest.dispenseRequest.quantity Quantity
MedicationRequest.dispenseRequest.expectedSupplyDuration Duration

MedicationAdministration resource
MedicationAdministration.identifier Identifier*
MedicationAdministration.status code
MedicationAdministration.category CodeableConcept
MedicationAdministration.medication[x] CodeableConcept|Reference
MedicationAdministration.subject Reference
MedicationAdministration.context Reference
MedicationAdministration.effective[x] dateTime|Period
MedicationAdministration.reasonCode CodeableConcept*
MedicationAdministration.request Reference
MedicationAdministration.dosage BackboneElement
MedicationAdministration.dosage.text string
MedicationAdministration.dosage.route CodeableConcept
MedicationAdministration.dosage.dose Quantity

Immunization resource
Immunization.identifier Identifier*
Immunization.status code
Immunization.statusReason CodeableConcept
Immunization.vaccineCode CodeableConcept
Immunization.patient Reference
Immunization.encounter Reference
Immunization.occurrence[x] dateTime|string
Immunization.recorded dateTime
Immunization.primarySource boolean
Immunization.location Reference
Immunization.lotNumber string
Immunization.expirationDate date
Immunization.site CodeableConcept
Immunization.route CodeableConcept
Immunization.doseQuantity Quantity
Immunization.note Annotation*
Immunization.reasonCode CodeableConcept*

AllergyIntolerance resource
AllergyIntolerance.identifier Identifier*
AllergyIntolerance.clinicalStatus CodeableConcept
AllergyIntolerance.verificationStatus CodeableConcept
AllergyIntolerance.type code
AllergyIntolerance.category code*
AllergyIntolerance.criticality code
AllergyIntolerance.code CodeableConcept
AllergyIntolerance.patient Reference
AllergyIntolerance.encounter Reference
AllergyIntolerance.onset[x] dateTime|Age|Period|Range|string
AllergyIntolerance.recordedDate dateTime
AllergyIntolerance.lastOccurrence dateTime
AllergyIntolerance.reaction BackboneElement*
AllergyIntolerance.reaction.substance CodeableConcept
AllergyIntolerance.reaction.manifestation CodeableConcept*
AllergyIntolerance.reaction.severity code
AllergyIntolerance.reaction.onset dateTime

DiagnosticReport resource
DiagnosticReport.identifier Identifier*
DiagnosticReport.basedOn Reference*
DiagnosticReport.status code
DiagnosticReport.category CodeableConcept*
DiagnosticReport.code CodeableConcept
DiagnosticReport.subject Reference
DiagnosticReport.encounter Reference
DiagnosticReport.effective[x] dateTime|Period
DiagnosticReport.issued instant
DiagnosticReport.performer Reference*
DiagnosticReport.result Reference*
DiagnosticReport.conclusion string
DiagnosticReport.presentedForm Attachment*

DocumentReference resource
DocumentReference.identifier Identifier*
DocumentReference.status code
DocumentReference.type CodeableConcept
DocumentReference.category CodeableConcept*
DocumentReference.subject Reference
DocumentReference.date instant
DocumentReference.author Reference*
DocumentReference.custodian Reference
DocumentReference.description string
DocumentReference.content BackboneElement*
DocumentReference.content.attachment Attachment
DocumentReference.content.format Coding
DocumentReference.context BackboneElement
DocumentReference.context.encounter Reference*
DocumentReference.context.period Period

CarePlan resource
CarePlan.identifier Identifier*
CarePlan.basedOn Reference*
CarePlan.status code
CarePlan.intent code
CarePlan.category CodeableConcept*
CarePlan.title string
CarePlan.description string
CarePlan.subject Reference
CarePlan.encounter Reference
CarePlan.period Period
CarePlan.created dateTime
CarePlan.author Reference
CarePlan.careTeam Reference*
CarePlan.addresses Reference*
CarePlan.goal Reference*
CarePlan.activity BackboneElement*
CarePlan.activity.reference Reference
CarePlan.activity.detail BackboneElement
CarePlan.activity.detail.kind code
CarePlan.activity.detail.code CodeableConcept
CarePlan.activity.detail.reasonCode CodeableConcept*
CarePlan.activity.detail.status code
CarePlan.activity.detail.location Reference
CarePlan.activity.detail.scheduled[x] Timing|Period|string

CareTeam resource
CareTeam.identifier Identifier*
CareTeam.status code
CareTeam.category CodeableConcept*
CareTeam.name string
CareTeam.subject Reference
CareTeam.encounter Reference
CareTeam.period Period
CareTeam.participant BackboneElement*
CareTeam.participant.role CodeableConcept*
CareTeam.participant.member Reference
CareTeam.participant.onBehalfOf Reference
CareTeam.participant.period Period
CareTeam.reasonCode CodeableConcept*
CareTeam.managingOrganization Reference*

Goal resource
Goal.identifier Identifier*
Goal.lifecycleStatus code
Goal.achievementStatus CodeableConcept
Goal.category CodeableConcept*
Goal.priority CodeableConcept
Goal.description CodeableConcept
Goal.subject Reference
Goal.start[x] date|CodeableConcept
Goal.target BackboneElement*
Goal.target.measure CodeableConcept
Goal.target.detail[x] Quantity|Range|CodeableConcept|string|boolean|integer|Ratio
Goal.target.due[x] date|Duration
Goal.statusDate date
Goal.statusReason string
Goal.expressedBy Reference
Goal.addresses Reference*
Goal.note Annotation*

Provenance resource
Provenance.target Reference*
Provenance.occurred[x] Period|dateTime
Provenance.recorded instant
Provenance.policy uri*
Provenance.location Reference
Provenance.reason CodeableConcept*
Provenance.activity CodeableConcept
Provenance.agent BackboneElement*
Provenance.agent.type CodeableConcept
Provenance.agent.role CodeableConcept*
Provenance.agent.who Reference
Provenance.agent.onBehalfOf Reference
Provenance.signature Signature*

Organization resource
Organization.identifier Identifier*
Organization.active boolean
Organization.type CodeableConcept*
Organization.name string
Organization.alias string*
Organization.telecom ContactPoint*
Organization.address Address*
Organization.partOf Reference

Practitioner resource
Practitioner.identifier Identifier*
Practitioner.active boolean
Practitioner.name HumanName*
Practitioner.telecom ContactPoint*
Practitioner.address Address*
Practitioner.gender code
Practitioner.birthDate date
Practitioner.qualification BackboneElement*
Practitioner.qualification.code CodeableConcept
Practitioner.qualification.period Period
Practitioner.qualification.issuer Reference

PractitionerRole resource
PractitionerRole.identifier Identifier*
PractitionerRole.active boolean
PractitionerRole.period Period
PractitionerRole.practitioner Reference
PractitionerRole.organization Reference
PractitionerRole.code CodeableConcept*
PractitionerRole.specialty CodeableConcept*
PractitionerRole.location Reference*
PractitionerRole.telecom ContactPoint*

Location resource
Location.identifier Identifier*
Location.status code
Location.name string
Location.alias string*
Location.description string
Location.mode code
Location.type CodeableConcept*
Location.telecom ContactPoint*
Location.address Address
Location.position BackboneElement
Location.position.longitude decimal
Location.position.latitude decimal
Location.position.altitude decimal
Location.managingOrganization Reference
Location.partOf Reference

Device resource
Device.identifier Identifier*
Device.udiCarrier BackboneElement*
Device.udiCarrier.deviceIdentifier string
Device.udiCarrier.carrierHRF string
Device.status code
Device.distinctIdentifier string
Device.manufacturer string
Device.manufactureDate dateTime
Device.expirationDate dateTime
Device.lotNumber string
Device.serialNumber string
Device.deviceName BackboneElement*
Device.deviceName.name string
Device.deviceName.type code
Device.type CodeableConcept
Device.patient Reference

Medication resource
Medication.identifier Identifier*
Medication.code CodeableConcept
Medication.status code
Medication.form CodeableConcept
Medication.amount Ratio
"#;

pub(super) fn load_into(table: &mut SchemaTable) {
    for line in R4_CORE.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((path, spec)) = line.split_once(' ') else {
            continue;
        };
        if spec == "resource" {
            table.register_resource(path);
            continue;
        }
        let (spec, repeated) = match spec.strip_suffix('*') {
            Some(inner) => (inner, true),
            None => (spec, false),
        };
        let types: Vec<String> = spec.split('|').map(str::to_string).collect();
        table.add_element(path, &types, repeated, None);
    }

    for alias in QUANTITY_PROFILES {
        table.alias_type(alias, "Quantity");
    }
}
